//! End-to-end deployment scenarios over in-memory storage.

mod support;

use std::collections::HashSet;

use gram_core::deployments::{CreateDeploymentForm, EvolveForm};
use gram_core::types::{DeploymentStatus, EventKind};
use serde_json::json;

use support::{
    Harness, assert_status_monotonic, create_form, functions, functions_archive, openapi,
    todo_manifest,
};

fn sorted(mut names: Vec<String>) -> Vec<String> {
    names.sort();
    names
}

// ===== OpenAPI =====

#[tokio::test]
async fn single_openapi_create() {
    let h = Harness::new();
    let asset = h.upload_fixture("todo.yaml").await;

    let deployment = h
        .service
        .create_deployment(&h.auth, create_form("todo-1", vec![openapi(asset, "Todo", "test-doc")]))
        .await
        .unwrap();

    assert_eq!(deployment.status, DeploymentStatus::Completed);
    assert_eq!(deployment.openapiv3_tool_count, 5);
    assert_eq!(
        h.http_tool_names(deployment.id).await,
        vec![
            "test_doc_get_todos",
            "test_doc_create_todo",
            "test_doc_get_todo_by_id",
            "test_doc_update_todo",
            "test_doc_delete_todo",
        ]
    );

    let tools = h.http_tools(deployment.id).await;
    let get_by_id = &tools[2];
    assert_eq!(get_by_id.method, "GET");
    assert_eq!(get_by_id.path, "/todos/{id}");
    assert_eq!(get_by_id.server_env_var, "TEST_DOC_SERVER_URL");
    assert_eq!(
        get_by_id.default_server_url.as_deref(),
        Some("https://todo.example.com/v1")
    );
    assert_eq!(
        get_by_id.schema["properties"]["pathParameters"]["required"],
        json!(["id"])
    );

    let events = h.events(deployment.id).await;
    assert_status_monotonic(&events);
    let kinds: Vec<EventKind> = events.iter().map(|e| e.event).collect();
    assert_eq!(
        kinds,
        vec![EventKind::Created, EventKind::Pending, EventKind::Completed]
    );
}

#[tokio::test]
async fn multi_document_create() {
    let h = Harness::new();
    let petstore = h.upload_fixture("petstore.json").await;
    let todo = h.upload_fixture("todo.yaml").await;

    let deployment = h
        .service
        .create_deployment(
            &h.auth,
            create_form(
                "multi",
                vec![
                    openapi(petstore, "Petstore", "petstore-api"),
                    openapi(todo, "Todo", "todo-api"),
                ],
            ),
        )
        .await
        .unwrap();

    assert_eq!(deployment.status, DeploymentStatus::Completed);
    assert_eq!(deployment.openapiv3_tool_count, 9);
    assert_eq!(
        sorted(h.http_tool_names(deployment.id).await),
        sorted(
            [
                "petstore_api_list_pets",
                "petstore_api_create_pets",
                "petstore_api_show_pet_by_id",
                "petstore_api_delete_pet",
                "todo_api_get_todos",
                "todo_api_create_todo",
                "todo_api_get_todo_by_id",
                "todo_api_update_todo",
                "todo_api_delete_todo",
            ]
            .map(String::from)
            .to_vec()
        )
    );
}

#[tokio::test]
async fn partial_failure_keeps_valid_tools() {
    let h = Harness::new();
    let petstore = h.upload_fixture("petstore.json").await;
    let invalid = h.upload_fixture("invalid.yaml").await;

    let deployment = h
        .service
        .create_deployment(
            &h.auth,
            create_form(
                "partial",
                vec![
                    openapi(petstore, "Petstore", "petstore"),
                    openapi(invalid, "Broken", "broken"),
                ],
            ),
        )
        .await
        .unwrap();

    assert_eq!(deployment.status, DeploymentStatus::Failed);
    assert_eq!(deployment.openapiv3_tool_count, 4);

    let events = h.events(deployment.id).await;
    assert_status_monotonic(&events);
    assert!(
        events
            .iter()
            .any(|e| e.event == EventKind::Error && e.message.starts_with("Broken: "))
    );
    assert_eq!(
        events.last().map(|e| e.message.as_str()),
        Some("1 attachment failed to process")
    );
}

// ===== Idempotency & evolution =====

#[tokio::test]
async fn idempotent_concurrent_create() {
    let h = Harness::new();
    let asset = h.upload_fixture("todo.yaml").await;
    let form = create_form("k", vec![openapi(asset, "Todo", "todo")]);

    let mut handles = Vec::new();
    for _ in 0..5 {
        let service = h.service.clone();
        let auth = h.auth.clone();
        let form = form.clone();
        handles.push(tokio::spawn(async move {
            service.create_deployment(&auth, form).await
        }));
    }

    let mut ids = HashSet::new();
    for handle in handles {
        let deployment = handle.await.unwrap().unwrap();
        assert_eq!(deployment.status, DeploymentStatus::Completed);
        ids.insert(deployment.id);
    }

    assert_eq!(ids.len(), 1);
    let id = ids.into_iter().next().unwrap();
    assert_eq!(h.http_tools(id).await.len(), 5);

    let page = h.service.list_deployments(&h.auth, None).await.unwrap();
    assert_eq!(page.items.len(), 1);

    let events = h.events(id).await;
    assert_eq!(
        events.iter().filter(|e| e.event == EventKind::Pending).count(),
        1
    );
}

#[tokio::test]
async fn evolve_with_exclusion() {
    let h = Harness::new();
    let doc1 = h.upload_fixture("petstore.json").await;
    let doc2 = h.upload_fixture("todo.yaml").await;

    let original = h
        .service
        .create_deployment(
            &h.auth,
            create_form(
                "two-docs",
                vec![openapi(doc1, "Doc 1", "doc-1"), openapi(doc2, "Doc 2", "doc-2")],
            ),
        )
        .await
        .unwrap();
    let before = h.snapshot(original.id).await;

    let evolved = h
        .service
        .evolve(
            &h.auth,
            EvolveForm {
                exclude_openapiv3_assets: vec![doc1.to_string()],
                ..EvolveForm::default()
            },
        )
        .await
        .unwrap();

    assert_ne!(evolved.id, original.id);
    assert_eq!(evolved.cloned_from, Some(original.id));
    assert_eq!(evolved.status, DeploymentStatus::Completed);
    assert_eq!(evolved.openapiv3_assets.len(), 1);
    assert_eq!(evolved.openapiv3_assets[0].asset_id, doc2);
    assert!(
        h.http_tool_names(evolved.id)
            .await
            .iter()
            .all(|name| name.starts_with("doc_2_"))
    );
    assert_eq!(evolved.openapiv3_tool_count, 5);

    assert_eq!(h.snapshot(original.id).await, before);
}

// ===== Functions =====

#[tokio::test]
async fn functions_manifest() {
    let h = Harness::new();
    let archive = h.upload(functions_archive(&todo_manifest())).await;

    let deployment = h
        .service
        .create_deployment(
            &h.auth,
            CreateDeploymentForm {
                idempotency_key: "fns".to_string(),
                functions: vec![functions(archive, "todo-fns", "nodejs:22")],
                ..CreateDeploymentForm::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(deployment.status, DeploymentStatus::Completed);
    assert_eq!(deployment.functions_tool_count, 4);

    let tools = h.function_tools(deployment.id).await;
    let names: HashSet<&str> = tools.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(
        names,
        HashSet::from(["list_all_todos", "get_todo", "create_todo", "share_todos"])
    );
    assert!(tools.iter().all(|t| t.runtime == "nodejs:22"));
}

#[tokio::test]
async fn functions_manifest_resources_are_stored() {
    let h = Harness::new();
    let mut manifest = todo_manifest();
    manifest["resources"] = json!([
        {"name": "todo_guide", "description": "How todos work", "uri": "file:///guide.md",
         "mimeType": "text/markdown"},
        {"name": "todo_stats", "uri": "todos://stats?range=week", "meta": {"cache": "none"}}
    ]);
    let archive = h.upload(functions_archive(&manifest)).await;

    let deployment = h
        .service
        .create_deployment(
            &h.auth,
            CreateDeploymentForm {
                idempotency_key: "fns-resources".to_string(),
                functions: vec![functions(archive, "todo-fns", "nodejs:22")],
                ..CreateDeploymentForm::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(deployment.status, DeploymentStatus::Completed);
    assert_eq!(deployment.functions_tool_count, 4);

    let resources = h.function_resources(deployment.id).await;
    let urns: Vec<&str> = resources.iter().map(|r| r.resource_urn.as_str()).collect();
    assert_eq!(
        urns,
        vec![
            "resources:function:todo-fns:file-guide-md",
            "resources:function:todo-fns:todos-stats-range-week",
        ]
    );
    assert!(resources.iter().all(|r| r.runtime == "nodejs:22"));
    assert_eq!(resources[1].meta, Some(json!({"cache": "none"})));
}

#[tokio::test]
async fn functions_manifest_with_bad_tools_completes_without_tools() {
    let h = Harness::new();
    let manifest = json!({
        "version": "0.0.0",
        "tools": [
            {"name": "good_tool", "inputSchema": {"type": "object"}},
            {"description": "missing a name", "inputSchema": {"type": "object"}}
        ]
    });
    let archive = h.upload(functions_archive(&manifest)).await;

    let deployment = h
        .service
        .create_deployment(
            &h.auth,
            CreateDeploymentForm {
                idempotency_key: "bad-fns".to_string(),
                functions: vec![functions(archive, "bad-fns", "nodejs:22")],
                ..CreateDeploymentForm::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(deployment.status, DeploymentStatus::Completed);
    assert_eq!(deployment.functions_tool_count, 0);
    assert!(
        h.events(deployment.id)
            .await
            .iter()
            .any(|e| e.event == EventKind::Error && e.message.contains("invalid manifest"))
    );
}
