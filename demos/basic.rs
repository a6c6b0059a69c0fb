use serde::{Deserialize, Serialize};
use wallarm_api::{Method, RequestBody, WallarmClient};

#[derive(Debug, Deserialize)]
struct UserDetails {
    body: UserDetailsBody,
}

#[derive(Debug, Deserialize)]
struct UserDetailsBody {
    clientid: u64,
}

#[derive(Serialize)]
struct WallarmMode<'a> {
    mode: &'a str,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let api = WallarmClient::from_env()?;

    let details: UserDetails = api
        .execute_json(Method::POST, "/v1/user", "userdetails", ())
        .await?;
    let client_id = details.body.clientid;
    println!("client id: {client_id}");

    let path = format!("/v2/client/{client_id}/rules/wallarm_mode");
    let mode = RequestBody::json(&WallarmMode { mode: "monitoring" })?;
    api.execute(Method::PUT, &path, "wallarm_mode", mode).await?;

    let app = RequestBody::json(&serde_json::json!({
        "clientid": client_id,
        "id": 42,
        "name": "demo-app",
    }))?;
    match api
        .execute(Method::POST, "/v1/objects/pool/create", "app", app)
        .await
    {
        Ok(_) => println!("application created"),
        Err(err) if err.is_existing_resource() => println!("application already exists"),
        Err(err) => return Err(err.into()),
    }

    Ok(())
}
