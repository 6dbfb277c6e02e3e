//! Exercises the vision resolver against a local mock of the model API.

use std::time::Duration;

use serde_json::json;

use webpilot::errors::NavError;
use webpilot::intent::Action;
use webpilot::{ActionResolver, Command, Screenshot, Settings, VisionResolver};

/// Serve exactly one HTTP response on a random local port, in the shape
/// the messages API uses.
fn serve_once(status: u16, body: String) -> String {
    let server = tiny_http::Server::http("127.0.0.1:0").expect("bind mock server");
    let addr = server.server_addr().to_ip().expect("ip addr");
    std::thread::spawn(move || {
        if let Ok(request) = server.recv() {
            let response = tiny_http::Response::from_string(body).with_status_code(status);
            let _ = request.respond(response);
        }
    });
    format!("http://{addr}")
}

fn model_reply(text: &str) -> String {
    json!({
        "id": "msg_test",
        "content": [{ "type": "text", "text": text }],
    })
    .to_string()
}

fn resolver_against(api_base: String) -> VisionResolver {
    let settings = Settings {
        api_key: Some("test-key".to_string()),
        api_base,
        ..Settings::default()
    };
    VisionResolver::new(&settings).expect("resolver")
}

fn screenshot() -> Screenshot {
    Screenshot {
        data: vec![0xff, 0xd8, 0xff, 0xe0],
        width: 1280,
        height: 800,
    }
}

#[tokio::test]
async fn fenced_reply_with_out_of_frame_point_resolves_to_a_clamped_click() {
    let text = concat!(
        "Here is what I found on the page:\n",
        "```json\n",
        "{\"reasoning\": \"The search button sits at the top right.\",\n",
        " \"action\": \"click\",\n",
        " \"selector\": \"Search\",\n",
        " \"click_point\": {\"x\": 1.2, \"y\": -0.05},\n",
        " \"speak\": \"Highlighting the search button.\"}\n",
        "```"
    );
    let api_base = serve_once(200, model_reply(text));
    let resolver = resolver_against(api_base);

    let intent = resolver
        .resolve(&Command::typed("click search"), &screenshot(), "https://example.com")
        .await
        .expect("intent");

    match intent.action {
        Action::Click(target) => {
            assert_eq!(target.selector.as_deref(), Some("Search"));
            let point = target.click_point.expect("click point");
            assert_eq!(point.x, 1.0);
            assert_eq!(point.y, 0.0);
        }
        other => panic!("expected a click, got {other:?}"),
    }
    assert_eq!(intent.speak, "Highlighting the search button.");
}

#[tokio::test]
async fn server_errors_surface_as_upstream_failures() {
    let api_base = serve_once(500, r#"{"error": {"message": "overloaded"}}"#.to_string());
    let resolver = resolver_against(api_base);

    let err = resolver
        .resolve(&Command::typed("click search"), &screenshot(), "https://example.com")
        .await
        .expect_err("should fail");
    assert!(matches!(err, NavError::Upstream(_)), "got {err:?}");
}

#[tokio::test]
async fn prose_without_json_is_a_parse_failure() {
    let api_base = serve_once(
        200,
        model_reply("I'm not able to identify any actionable element here."),
    );
    let resolver = resolver_against(api_base);

    let err = resolver
        .resolve(&Command::typed("click search"), &screenshot(), "https://example.com")
        .await
        .expect_err("should fail");
    assert!(matches!(err, NavError::Parse(_)), "got {err:?}");
}

#[tokio::test]
async fn unknown_action_kinds_are_rejected_in_validation() {
    let text = r#"{"reasoning": "r", "action": "type_into", "selector": "Search", "speak": "s"}"#;
    let api_base = serve_once(200, model_reply(text));
    let resolver = resolver_against(api_base);

    let err = resolver
        .resolve(&Command::typed("type hello"), &screenshot(), "https://example.com")
        .await
        .expect_err("should fail");
    assert!(matches!(err, NavError::Validation(_)), "got {err:?}");
}

#[tokio::test]
async fn slow_upstream_hits_the_configured_timeout() {
    // A server that accepts the connection but never answers within the
    // one-second deadline configured below.
    let server = tiny_http::Server::http("127.0.0.1:0").expect("bind mock server");
    let addr = server.server_addr().to_ip().expect("ip addr");
    std::thread::spawn(move || {
        if let Ok(request) = server.recv() {
            std::thread::sleep(Duration::from_secs(5));
            let _ = request.respond(tiny_http::Response::from_string(model_reply("{}")));
        }
    });
    let settings = Settings {
        api_key: Some("test-key".to_string()),
        api_base: format!("http://{addr}"),
        request_timeout_secs: 1,
        ..Settings::default()
    };
    let resolver = VisionResolver::new(&settings).expect("resolver");

    let err = resolver
        .resolve(&Command::typed("click search"), &screenshot(), "https://example.com")
        .await
        .expect_err("should time out");
    assert!(matches!(err, NavError::Timeout(_)), "got {err:?}");
}

#[tokio::test]
async fn missing_text_content_is_an_upstream_failure() {
    let api_base = serve_once(200, r#"{"id": "msg_test", "content": []}"#.to_string());
    let resolver = resolver_against(api_base);

    let err = resolver
        .resolve(&Command::typed("click search"), &screenshot(), "https://example.com")
        .await
        .expect_err("should fail");
    assert!(matches!(err, NavError::Upstream(_)), "got {err:?}");
}
