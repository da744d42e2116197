use mockito::{Matcher, Server};
use selene::sponsor::{HttpAuthClient, verify};

#[tokio::test]
async fn authorized_token_yields_subject() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/api/auth/authorize")
        .match_body(Matcher::Json(serde_json::json!({"token": "t0k"})))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"authorized":true,"subject":"jane"}"#)
        .create_async()
        .await;

    let client = HttpAuthClient::new(&server.url()).unwrap();
    let sponsorship = verify(&client, "t0k").await.unwrap();
    assert_eq!(sponsorship.subject(), Some("jane"));
    mock.assert_async().await;
}

#[tokio::test]
async fn server_error_aborts_with_context() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/api/auth/authorize")
        .with_status(503)
        .create_async()
        .await;

    let client = HttpAuthClient::new(&server.url()).unwrap();
    let err = verify(&client, "t0k").await.unwrap_err();
    assert!(err.to_string().starts_with("sponsortoken: "), "{}", err);
}
