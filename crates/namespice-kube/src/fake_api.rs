//! In-process API server for tests
//!
//! Requests from a real `kube::Client` are answered by a closure over the
//! request path and query, so discovery, list and watch code paths run
//! unchanged.

use http::{Request, Response};
use kube::Client;
use kube::client::Body;
use serde_json::{Value, json};

/// How one request is answered
pub enum Reply {
    /// 200 with a JSON body
    Json(Value),
    /// Failure status with a `Status` body
    Status(u16, &'static str),
    /// No answer at all, like a watch with nothing to report
    Hang,
}

/// Client whose requests are answered by `respond(path, query)`
pub fn client<F>(respond: F) -> Client
where
    F: Fn(&str, &str) -> Reply + Send + 'static,
{
    let (service, mut handle) = tower_test::mock::pair::<Request<Body>, Response<Body>>();

    tokio::spawn(async move {
        let mut pending = Vec::new();
        while let Some((request, send)) = handle.next_request().await {
            let uri = request.uri();
            match respond(uri.path(), uri.query().unwrap_or_default()) {
                Reply::Json(body) => send.send_response(response(200, &body)),
                Reply::Status(code, reason) => send.send_response(response(
                    code,
                    &json!({
                        "kind": "Status",
                        "apiVersion": "v1",
                        "metadata": {},
                        "status": "Failure",
                        "message": format!("{} {}", uri.path(), reason),
                        "reason": reason,
                        "code": code,
                    }),
                )),
                Reply::Hang => pending.push(send),
            }
        }
    });

    Client::new(service, "default")
}

fn response(code: u16, body: &Value) -> Response<Body> {
    Response::builder()
        .status(code)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap()
}

/// `/apis` body listing groups with their versions, the first preferred
pub fn group_list(groups: &[(&str, &[&str])]) -> Value {
    let groups: Vec<Value> = groups
        .iter()
        .map(|(name, versions)| {
            let versions: Vec<Value> = versions
                .iter()
                .map(|v| json!({"groupVersion": format!("{}/{}", name, v), "version": v}))
                .collect();
            json!({
                "name": name,
                "preferredVersion": versions[0].clone(),
                "versions": versions,
            })
        })
        .collect();
    json!({"kind": "APIGroupList", "apiVersion": "v1", "groups": groups})
}

/// `/api` body for the core group
pub fn core_versions() -> Value {
    json!({"kind": "APIVersions", "versions": ["v1"], "serverAddressByClientCIDRs": []})
}

/// Resource list of one group-version: (plural, kind, namespaced, listable)
pub fn resource_list(group_version: &str, resources: &[(&str, &str, bool, bool)]) -> Value {
    let resources: Vec<Value> = resources
        .iter()
        .map(|(plural, kind, namespaced, listable)| {
            let verbs: &[&str] = if *listable {
                &["create", "delete", "get", "list", "patch", "update", "watch"]
            } else {
                &["create"]
            };
            json!({
                "name": plural,
                "singularName": kind.to_lowercase(),
                "namespaced": namespaced,
                "kind": kind,
                "verbs": verbs,
            })
        })
        .collect();
    json!({
        "kind": "APIResourceList",
        "apiVersion": "v1",
        "groupVersion": group_version,
        "resources": resources,
    })
}
