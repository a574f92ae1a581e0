//! Operation table for a subset of the VPC API.
//!
//! Each entry is plain data consumed by [`crate::operation::build`];
//! [`crate::VpcClient::call`] looks operations up by id.

use crate::descriptor::Method;
use crate::operation::{OperationSpec, ParamSpec, JSON, MERGE_PATCH_JSON};
use crate::{Result, VpcError};

const PAGING: [ParamSpec; 2] = [
    ParamSpec::query("start", "start"),
    ParamSpec::query("limit", "limit"),
];

pub const LIST_VPCS: OperationSpec = OperationSpec {
    operation_id: "list_vpcs",
    method: Method::Get,
    url_template: "/vpcs",
    params: &[
        PAGING[0],
        PAGING[1],
        ParamSpec::query("resourceGroup", "resource_group"),
        ParamSpec::query("classicAccess", "classic_access"),
    ],
    accept: Some(JSON),
    content_type: None,
};

pub const CREATE_VPC: OperationSpec = OperationSpec {
    operation_id: "create_vpc",
    method: Method::Post,
    url_template: "/vpcs",
    params: &[
        ParamSpec::body("addressPrefixManagement", "address_prefix_management"),
        ParamSpec::body("classicAccess", "classic_access"),
        ParamSpec::body("name", "name"),
        ParamSpec::body("resourceGroup", "resource_group"),
    ],
    accept: Some(JSON),
    content_type: Some(JSON),
};

pub const DELETE_VPC: OperationSpec = OperationSpec {
    operation_id: "delete_vpc",
    method: Method::Delete,
    url_template: "/vpcs/{id}",
    params: &[
        ParamSpec::path("id", "id"),
        ParamSpec::header("ifMatch", "If-Match"),
    ],
    accept: None,
    content_type: None,
};

pub const GET_VPC: OperationSpec = OperationSpec {
    operation_id: "get_vpc",
    method: Method::Get,
    url_template: "/vpcs/{id}",
    params: &[ParamSpec::path("id", "id")],
    accept: Some(JSON),
    content_type: None,
};

pub const UPDATE_VPC: OperationSpec = OperationSpec {
    operation_id: "update_vpc",
    method: Method::Patch,
    url_template: "/vpcs/{id}",
    params: &[
        ParamSpec::path("id", "id"),
        ParamSpec::body_root("vpcPatch").required(),
        ParamSpec::header("ifMatch", "If-Match"),
    ],
    accept: Some(JSON),
    content_type: Some(MERGE_PATCH_JSON),
};

pub const LIST_VPC_ROUTES: OperationSpec = OperationSpec {
    operation_id: "list_vpc_routes",
    method: Method::Get,
    url_template: "/vpcs/{vpc_id}/routes",
    params: &[
        ParamSpec::path("vpcId", "vpc_id"),
        ParamSpec::query("zone", "zone"),
        PAGING[0],
        PAGING[1],
    ],
    accept: Some(JSON),
    content_type: None,
};

pub const LIST_SUBNETS: OperationSpec = OperationSpec {
    operation_id: "list_subnets",
    method: Method::Get,
    url_template: "/subnets",
    params: &[
        PAGING[0],
        PAGING[1],
        ParamSpec::query("resourceGroup", "resource_group"),
        ParamSpec::query("zone", "zone"),
        ParamSpec::query("vpc", "vpc"),
        ParamSpec::query("routingTable", "routing_table"),
    ],
    accept: Some(JSON),
    content_type: None,
};

pub const CREATE_SUBNET: OperationSpec = OperationSpec {
    operation_id: "create_subnet",
    method: Method::Post,
    url_template: "/subnets",
    params: &[ParamSpec::body_root("subnetPrototype").required()],
    accept: Some(JSON),
    content_type: Some(JSON),
};

pub const GET_SUBNET: OperationSpec = OperationSpec {
    operation_id: "get_subnet",
    method: Method::Get,
    url_template: "/subnets/{id}",
    params: &[ParamSpec::path("id", "id")],
    accept: Some(JSON),
    content_type: None,
};

pub const LIST_INSTANCES: OperationSpec = OperationSpec {
    operation_id: "list_instances",
    method: Method::Get,
    url_template: "/instances",
    params: &[
        PAGING[0],
        PAGING[1],
        ParamSpec::query("resourceGroup", "resource_group"),
        ParamSpec::query("name", "name"),
        ParamSpec::query("vpc", "vpc"),
        ParamSpec::query("dedicatedHost", "dedicated_host"),
        ParamSpec::query("placementGroup", "placement_group"),
    ],
    accept: Some(JSON),
    content_type: None,
};

/// Every operation in the table.
pub const OPERATIONS: &[OperationSpec] = &[
    LIST_VPCS,
    CREATE_VPC,
    DELETE_VPC,
    GET_VPC,
    UPDATE_VPC,
    LIST_VPC_ROUTES,
    LIST_SUBNETS,
    CREATE_SUBNET,
    GET_SUBNET,
    LIST_INSTANCES,
];

/// Looks an operation up by id.
pub fn find_operation(operation_id: &str) -> Result<&'static OperationSpec> {
    OPERATIONS
        .iter()
        .find(|operation| operation.operation_id == operation_id)
        .ok_or_else(|| VpcError::Validation(format!("unknown operation '{operation_id}'")))
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use serde_json::json;

    use super::{find_operation, LIST_VPC_ROUTES, OPERATIONS};
    use crate::descriptor::placeholders;
    use crate::operation::{build, ParamLocation, Params};
    use crate::VpcError;

    #[test]
    fn operation_ids_are_unique() {
        let ids: HashSet<_> = OPERATIONS.iter().map(|op| op.operation_id).collect();
        assert_eq!(ids.len(), OPERATIONS.len());
    }

    #[test]
    fn path_params_match_placeholders() {
        for operation in OPERATIONS {
            let mut declared: Vec<&str> = operation
                .params
                .iter()
                .filter(|param| param.location == ParamLocation::Path)
                .map(|param| param.wire_name)
                .collect();
            let mut expected = placeholders(operation.url_template);
            declared.sort_unstable();
            expected.sort_unstable();
            assert_eq!(declared, expected, "{}", operation.operation_id);
            assert!(operation
                .params
                .iter()
                .filter(|param| param.location == ParamLocation::Path)
                .all(|param| param.required));
        }
    }

    #[test]
    fn every_operation_with_required_params_rejects_empty_params() {
        for operation in OPERATIONS {
            if operation.required().next().is_none() {
                continue;
            }
            let err = build(operation, &Params::new()).expect_err(operation.operation_id);
            assert!(
                err.to_string().starts_with("Missing required parameters: "),
                "{}",
                operation.operation_id
            );
        }
    }

    #[test]
    fn every_operation_honours_header_overrides() {
        for operation in OPERATIONS {
            let params = operation
                .required()
                .fold(Params::new(), |params, name| params.set(name, json!("x")))
                .header("Accept", "application/x-test")
                .header("Content-Type", "application/x-test-body");
            let descriptor = build(operation, &params).expect(operation.operation_id);
            assert_eq!(descriptor.headers["accept"], "application/x-test");
            assert_eq!(descriptor.headers["content-type"], "application/x-test-body");
        }
    }

    #[test]
    fn required_only_calls_leave_optional_keys_out() {
        for operation in OPERATIONS {
            let params = operation
                .required()
                .fold(Params::new(), |params, name| params.set(name, json!("x")));
            let descriptor = build(operation, &params).expect(operation.operation_id);
            assert!(descriptor.query_params.is_empty(), "{}", operation.operation_id);
            if let Some(serde_json::Value::Object(fields)) = &descriptor.body {
                assert!(fields.is_empty(), "{}", operation.operation_id);
            }
        }
    }

    #[test]
    fn camel_case_path_param_maps_to_wire_name() {
        let params = Params::new()
            .set("vpcId", "r006-1")
            .set("zone", json!({ "name": "us-south-1" }));
        let descriptor = build(&LIST_VPC_ROUTES, &params).expect("builds");
        assert_eq!(descriptor.path_params["vpc_id"], "r006-1");
        assert_eq!(
            descriptor.query_value("zone.name").map(ToString::to_string),
            Some("us-south-1".to_owned())
        );
    }

    #[test]
    fn unknown_operation_is_validation_error() {
        assert!(find_operation("get_vpc").is_ok());
        assert!(matches!(
            find_operation("launch_rocket"),
            Err(VpcError::Validation(_))
        ));
    }
}
