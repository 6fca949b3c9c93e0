//! Integration tests for connection setup driven by a schema-mapping document.

mod common;

use common::{connector, connector_with_schema, endpoint, person, seeded_directory, ROOT};
use xavyo_directory::{
    DirectoryConnector, EndpointConfig, ErrorKind, SchemaMap, SchemaMapLoader, Scope,
};

const DOCUMENT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feature xmlns="http://www.oracle.com/schema/oim/directory"
         connection-timeout="4000"
         response-timeout="9000"
         distinguished-name-casesensitive="false">
  <failover>
    <server host="replica.example.com" port="1389"/>
  </failover>
  <binary>
    <attribute>objectGUID</attribute>
  </binary>
  <account object-class="inetOrgPerson" object-prefix="uid"/>
</feature>"#;

#[test]
fn test_service_urls_follow_failover_order() {
    let directory = seeded_directory();
    let endpoint = EndpointConfig::new("host1", ROOT).with_failover("host2", 389);
    let connector = DirectoryConnector::with_factory(endpoint, SchemaMap::new(), directory).unwrap();

    assert_eq!(
        connector.service_urls(),
        vec!["ldap://host1:389/", "ldap://host2:389/"]
    );
}

#[test]
fn test_document_drives_environment() {
    let directory = seeded_directory();
    let schema = SchemaMapLoader::parse(DOCUMENT).unwrap();
    let mut connector = connector_with_schema(&directory, schema);

    connector
        .search()
        .search("ou=People", "(objectClass=*)", Scope::Object, &[])
        .unwrap();

    let state = directory.state();
    let environment = state.environments.last().unwrap();
    assert_eq!(environment.context, format!("ou=People,{ROOT}"));
    assert_eq!(environment.connect_timeout.as_millis(), 4000);
    assert_eq!(environment.read_timeout.as_millis(), 9000);
    assert!(environment.is_binary("objectguid"));
    assert_eq!(
        environment.service_urls(),
        vec!["ldap://ldap.example.com:389/", "ldap://replica.example.com:1389/"]
    );
    assert!(environment
        .provider_url
        .starts_with("ldap://ldap.example.com:389/ou%3DPeople%2Cdc%3Dexample%2Cdc%3Dcom "));
    assert_eq!(environment.properties()["security-credentials"], "******");
}

#[test]
fn test_case_insensitive_names_are_folded() {
    let directory = seeded_directory();
    directory.insert(&format!("uid=JDoe,ou=People,{ROOT}"), person("JDoe"));
    let schema = SchemaMapLoader::parse(DOCUMENT).unwrap();
    let mut connector = connector_with_schema(&directory, schema);

    let dn = connector.search().find_unique("ou=People", "uid", "jdoe").unwrap();
    assert_eq!(dn, "uid=jdoe,ou=people");
}

#[test]
fn test_normalize_undoes_denormalize() {
    let directory = seeded_directory();
    let connector = connector(&directory);

    for path in [
        "ou=People",
        "uid=jdoe,ou=People",
        "cn=Doe\\, John,ou=People",
        "cn=İlkay Şahin,ou=People",
    ] {
        let full = connector.denormalize(path);
        assert!(full.ends_with(ROOT));
        let relative = connector.normalize(&full);
        assert_eq!(relative, path);
        assert_eq!(connector.normalize(&relative), relative);
    }
    assert_eq!(connector.denormalize(""), ROOT);
}

#[test]
fn test_connect_reuses_session_for_mutations() {
    let directory = seeded_directory();
    let mut connector = connector(&directory);

    connector.connect("ou=People").unwrap();
    connector.connect("ou=Groups").unwrap();
    {
        let mut mutator = connector.mutate();
        mutator.create("uid=a", &person("a")).unwrap();
        mutator.create("uid=b", &person("b")).unwrap();
    }
    assert!(directory.contains(&format!("uid=a,ou=People,{ROOT}")));
    assert_eq!(directory.state().opened, 1);

    connector.disconnect();
    assert_eq!(directory.state().closed, 1);
}

#[test]
fn test_unreachable_directory_on_connect() {
    let directory = seeded_directory();
    directory.set_offline(true);
    let mut connector = connector(&directory);

    let err = connector.connect("").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Connection);
    assert!(!connector.is_connected());
}

#[test]
fn test_connector_debug_hides_credential() {
    let directory = seeded_directory();
    let connector =
        DirectoryConnector::with_factory(endpoint(), SchemaMap::new(), directory).unwrap();
    assert!(!format!("{connector:?}").contains("hunter2"));
}
