//! End-to-end rendering of descriptors into vendor connection strings.

#![allow(clippy::unwrap_used)]

use dbwatch_core::connection::{ConnectionDescriptor, build_connection_string};
use dbwatch_core::{BackendKind, ConnectionString, Credential};
use proptest::prelude::*;

#[test]
fn test_firebird_scenario_with_embedded_port() {
    let descriptor = ConnectionDescriptor::new(
        BackendKind::Firebird,
        "192.168.1.5:3051",
        "apw_user",
        "D:/KSBAZA/WAPTEKA.FDB",
    )
    .unwrap();

    let rendered =
        build_connection_string(&descriptor, &Credential::new("secret123".to_string())).unwrap();
    let text = rendered.expose();

    assert!(text.contains(r"Database=192.168.1.5:D:\KSBAZA\WAPTEKA.FDB"));
    assert!(text.contains("Port=3051"));
    assert!(text.contains("User=apw_user"));
    assert!(text.contains("Dialect=3"));
    assert!(text.contains("Charset=UTF8"));

    let redacted = rendered.redacted();
    assert!(!redacted.contains("secret123"));
    assert!(redacted.contains(r"Database=192.168.1.5:D:\KSBAZA\WAPTEKA.FDB"));
}

#[test]
fn test_oracle_scenario() {
    let descriptor = ConnectionDescriptor::new(BackendKind::Oracle, "dbhost", "apw_user", "/ORCL")
        .unwrap()
        .with_port(1521);

    let rendered = build_connection_string(&descriptor, &Credential::new("pw".to_string())).unwrap();
    let expected =
        ConnectionString::parse("Data Source=dbhost:1521/ORCL;User Id=apw_user;Password=pw;")
            .unwrap();

    assert_eq!(rendered, expected);
}

#[test]
fn test_password_with_separator_survives_rendering() {
    let descriptor =
        ConnectionDescriptor::new(BackendKind::Firebird, "fbhost", "sysdba", "C:/DB/A.FDB").unwrap();
    let rendered =
        build_connection_string(&descriptor, &Credential::new("a;b\"c".to_string())).unwrap();

    let reparsed = ConnectionString::parse(&rendered.expose()).unwrap();
    assert_eq!(reparsed.get("Password"), Some("a;b\"c"));
    assert_eq!(reparsed.get("Database"), Some(r"fbhost:C:\DB\A.FDB"));
}

fn firebird_path() -> impl Strategy<Value = String> {
    (
        prop::option::of("[A-Z]"),
        any::<bool>(),
        prop::collection::vec(("[A-Za-z0-9_]{1,8}", prop_oneof![Just('/'), Just('\\')]), 1..6),
        "[A-Za-z0-9_]{1,8}\\.(FDB|GDB)",
    )
        .prop_map(|(drive, leading_slash, segments, file)| {
            let mut path = String::new();
            if leading_slash {
                path.push('/');
            }
            if let Some(drive) = drive {
                path.push_str(&drive);
                path.push(':');
                path.push('/');
            }
            for (segment, separator) in segments {
                path.push_str(&segment);
                path.push(separator);
            }
            path.push_str(&file);
            path
        })
        .prop_filter("needs a forward slash", |path| path.contains('/'))
}

proptest! {
    #[test]
    fn prop_firebird_path_has_only_native_separators(
        server in "[a-z]{1,10}(\\.[a-z]{1,6})?(:[1-9][0-9]{0,3})?",
        path in firebird_path(),
    ) {
        let descriptor =
            ConnectionDescriptor::new(BackendKind::Firebird, server, "apw_user", path).unwrap();
        let rendered =
            build_connection_string(&descriptor, &Credential::new("x".to_string())).unwrap();

        let database = rendered.get("Database").unwrap();
        let (_, rendered_path) = database.split_once(':').unwrap();
        prop_assert!(!rendered_path.contains('/'), "forward slash left in {}", rendered_path);
    }
}
