//! Fixed smoke-test suite run by [`verify_all`](crate::verify_all).

use crate::{EndpointSpec, LevelSpec};
use backcheck_core::Method;
use serde_json::{Map, Value};

/// The hard-coded regression sequence: server bootstrap, basic CRUD, database
/// health. Deliberately smaller than the full training curriculum.
pub fn smoke_suite() -> Vec<LevelSpec> {
    let mut create_body = Map::new();
    create_body.insert("name".to_string(), Value::from("test"));

    vec![
        LevelSpec {
            level_id: "l0-server".to_string(),
            endpoints: vec![
                EndpointSpec::new(Method::Get, "/health").expect_status(200),
                EndpointSpec::new(Method::Get, "/ready").expect_status(200),
            ],
        },
        LevelSpec {
            level_id: "l1-crud".to_string(),
            endpoints: vec![
                EndpointSpec::new(Method::Get, "/resources").expect_status(200),
                EndpointSpec::new(Method::Post, "/resources")
                    .expect_status(201)
                    .with_body(create_body),
            ],
        },
        LevelSpec {
            level_id: "l2-database".to_string(),
            endpoints: vec![EndpointSpec::new(Method::Get, "/health/db").expect_status(200)],
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suite_shape_is_fixed() {
        let suite = smoke_suite();
        let ids: Vec<&str> = suite.iter().map(|l| l.level_id.as_str()).collect();
        assert_eq!(ids, ["l0-server", "l1-crud", "l2-database"]);
        assert_eq!(suite[0].endpoints.len(), 2);
        assert_eq!(suite[1].endpoints.len(), 2);
        assert_eq!(suite[2].endpoints.len(), 1);
    }

    #[test]
    fn crud_create_carries_a_body() {
        let suite = smoke_suite();
        let create = &suite[1].endpoints[1];
        assert_eq!(create.method, Method::Post);
        assert_eq!(create.expected_status, Some(201));
        let body = create.body.as_ref().expect("create body");
        assert_eq!(body.get("name"), Some(&Value::from("test")));
    }
}
