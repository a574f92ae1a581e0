use std::time::Duration;

use serde_json::json;
use vpc_client::{ClientOptions, Params, RetryOptions, VpcClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Credentials come from VPC_AUTH_TYPE / VPC_APIKEY or a credentials.env file.
    let client = VpcClient::new(ClientOptions::new().with_version("2024-04-30"))?;
    client.enable_retries(RetryOptions {
        max_retries: 3,
        max_retry_interval: Duration::from_secs(10),
        ..RetryOptions::default()
    });

    let mut params = Params::new().set("limit", 10);
    if let Ok(group) = std::env::var("VPC_RESOURCE_GROUP_ID") {
        params = params.set("resourceGroup", json!({ "id": group }));
    }

    let response = client.call("list_vpcs", params).await?;
    let vpcs = response.result["vpcs"].as_array().cloned().unwrap_or_default();
    for vpc in vpcs {
        println!("{} {}", vpc["id"], vpc["name"]);
    }

    Ok(())
}
