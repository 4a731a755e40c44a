//! Ticket store and ticket tool server tests.

use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::io::BufReader;

use repokit_agent::error::AgentError;
use repokit_agent::ipc::stdio::serve_lines;
use repokit_agent::ipc::ToolHandler;
use repokit_agent::tickets::store::{NewTicket, TicketUpdate};
use repokit_agent::tickets::{ReviewResult, Role, Status, TicketServer, TicketStore};

fn new_ticket(id: &str, criteria: &[&str]) -> NewTicket {
    NewTicket {
        id: id.into(),
        title: "Add hook".into(),
        description: "Wire the PreToolUse hook".into(),
        criteria: criteria.iter().map(|c| c.to_string()).collect(),
    }
}

fn status(to: Status) -> TicketUpdate {
    TicketUpdate {
        status: Some(to),
        ..TicketUpdate::default()
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

#[test]
fn create_get_list_delete() {
    let tmp = TempDir::new().unwrap();
    let store = TicketStore::new(tmp.path());

    store.create(new_ticket("b-ticket", &[])).unwrap();
    store.create(new_ticket("a-ticket", &["tests pass"])).unwrap();

    let ticket = store.get("a-ticket").unwrap();
    assert_eq!(ticket.status(), Status::Todo);
    assert_eq!(ticket.criteria.len(), 1);
    assert!(!ticket.criteria[0].met);
    assert_eq!(ticket.review.result, ReviewResult::Pending);

    let listed: Vec<String> = store.list().unwrap().into_iter().map(|s| s.id).collect();
    assert_eq!(listed, vec!["a-ticket", "b-ticket"]);

    store.delete("b-ticket").unwrap();
    assert!(matches!(
        store.get("b-ticket"),
        Err(AgentError::TicketNotFound { .. })
    ));
    assert!(matches!(
        store.delete("b-ticket"),
        Err(AgentError::TicketNotFound { .. })
    ));
}

#[test]
fn stored_document_shape() {
    let tmp = TempDir::new().unwrap();
    let store = TicketStore::new(tmp.path());
    store.create(new_ticket("G1_1", &["docs updated"])).unwrap();

    let raw = std::fs::read_to_string(tmp.path().join("_agent/tickets/G1_1.json")).unwrap();
    assert!(raw.ends_with('\n'));
    let doc: Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(
        doc,
        json!({
            "ticket": {
                "id": "G1_1",
                "title": "Add hook",
                "description": "Wire the PreToolUse hook",
                "status": "todo",
            },
            "criteria": [{"criterion": "docs updated", "met": false}],
            "progress": {"notes": ""},
            "review": {"result": "", "feedback": ""},
        })
    );

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(tmp.path().join("_agent/tickets/G1_1.json"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}

#[test]
fn create_rejects_duplicates_bad_ids_and_empty_fields() {
    let tmp = TempDir::new().unwrap();
    let store = TicketStore::new(tmp.path());
    store.create(new_ticket("dup", &[])).unwrap();

    let err = store.create(new_ticket("dup", &[])).unwrap_err();
    assert!(err.to_string().contains("already exists"));

    for id in ["", "../escape", "has space", "a/b"] {
        assert!(
            matches!(store.create(new_ticket(id, &[])), Err(AgentError::InvalidId { .. })),
            "{id:?}"
        );
    }

    let mut untitled = new_ticket("untitled", &[]);
    untitled.title.clear();
    assert!(store.create(untitled).is_err());
    assert!(!tmp.path().join("_agent/tickets/untitled.json").exists());
}

#[test]
fn required_criteria_are_appended_once() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(
        tmp.path().join("config.yaml"),
        "agent:\n  required_criteria:\n    - \"docs updated\"\n    - \"tests pass\"\n",
    )
    .unwrap();
    let store = TicketStore::open(tmp.path()).unwrap();

    let ticket = store.create(new_ticket("t1", &["tests pass", "api stable"])).unwrap();
    let criteria: Vec<&str> = ticket.criteria.iter().map(|c| c.criterion.as_str()).collect();
    assert_eq!(criteria, vec!["tests pass", "api stable", "docs updated"]);
}

#[test]
fn bad_config_is_reported() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join("config.yaml"), "agent: 42\n").unwrap();
    assert!(matches!(
        TicketStore::open(tmp.path()),
        Err(AgentError::ConfigParse { .. })
    ));
}

#[test]
fn invalid_files_are_listed_not_skipped() {
    let tmp = TempDir::new().unwrap();
    let store = TicketStore::new(tmp.path());
    store.create(new_ticket("good", &[])).unwrap();
    std::fs::write(store.dir().join("broken.json"), "{\"ticket\": 1}").unwrap();

    let listed = store.list().unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].id, "broken");
    assert_eq!(listed[0].status, "invalid");
    assert!(listed[0].error.as_deref().unwrap().contains("invalid schema"));
    assert_eq!(listed[1].status, "todo");
}

#[test]
fn full_lifecycle_through_review() {
    let tmp = TempDir::new().unwrap();
    let store = TicketStore::new(tmp.path());
    store.create(new_ticket("t1", &["tests pass"])).unwrap();

    store.update("t1", &status(Status::InProgress), Some(Role::Worker)).unwrap();
    let notes = TicketUpdate {
        status: Some(Status::Verify),
        notes: Some("done, see branch".into()),
        ..TicketUpdate::default()
    };
    let fields = store.update("t1", &notes, Some(Role::Worker)).unwrap();
    assert_eq!(fields, vec!["status", "notes"]);

    // Closing needs a pass and every criterion met.
    let pass_and_close = TicketUpdate {
        status: Some(Status::Closed),
        result: Some(ReviewResult::Pass),
        ..TicketUpdate::default()
    };
    let err = store
        .update("t1", &pass_and_close, Some(Role::Reviewer))
        .unwrap_err();
    assert!(err.to_string().contains("unmet criteria"));
    assert_eq!(store.get("t1").unwrap().review.result, ReviewResult::Pending);

    store.mark_criteria("t1", &[0], true).unwrap();
    store.update("t1", &pass_and_close, Some(Role::Reviewer)).unwrap();
    let ticket = store.get("t1").unwrap();
    assert_eq!(ticket.status(), Status::Closed);
    assert_eq!(ticket.progress.notes, "done, see branch");

    let err = store.update("t1", &status(Status::Todo), None).unwrap_err();
    assert!(err.to_string().contains("invalid transition: closed -> todo"));
}

#[test]
fn reopen_from_verify_needs_a_failed_review() {
    let tmp = TempDir::new().unwrap();
    let store = TicketStore::new(tmp.path());
    store.create(new_ticket("t1", &[])).unwrap();
    store.update("t1", &status(Status::Verify), Some(Role::Worker)).unwrap();

    let err = store.update("t1", &status(Status::Todo), Some(Role::Reviewer)).unwrap_err();
    assert!(err.to_string().contains("review.result must be 'fail'"));

    let fail = TicketUpdate {
        status: Some(Status::Todo),
        result: Some(ReviewResult::Fail),
        feedback: Some("missing tests".into()),
        ..TicketUpdate::default()
    };
    store.update("t1", &fail, Some(Role::Reviewer)).unwrap();
    let ticket = store.get("t1").unwrap();
    assert_eq!(ticket.status(), Status::Todo);
    assert_eq!(ticket.review.feedback, "missing tests");
}

#[test]
fn roles_gate_fields_and_transitions() {
    let tmp = TempDir::new().unwrap();
    let store = TicketStore::new(tmp.path());
    store.create(new_ticket("t1", &[])).unwrap();

    let review_by_worker = TicketUpdate {
        result: Some(ReviewResult::Pass),
        ..TicketUpdate::default()
    };
    let err = store.update("t1", &review_by_worker, Some(Role::Worker)).unwrap_err();
    assert!(err.to_string().contains("role worker cannot update fields"));

    let err = store
        .update("t1", &status(Status::InProgress), Some(Role::Reviewer))
        .unwrap_err();
    assert!(err.to_string().contains("role reviewer cannot transition todo -> in_progress"));

    assert!(store.update("t1", &TicketUpdate::default(), Some(Role::Worker)).unwrap().is_empty());
    // Same status is not a transition.
    store.update("t1", &status(Status::Todo), Some(Role::Worker)).unwrap();
}

#[test]
fn mark_criteria_is_all_or_nothing() {
    let tmp = TempDir::new().unwrap();
    let store = TicketStore::new(tmp.path());
    store.create(new_ticket("t1", &["a", "b"])).unwrap();
    store.create(new_ticket("bare", &[])).unwrap();

    let err = store.mark_criteria("t1", &[0, 5], true).unwrap_err();
    assert!(err.to_string().contains("index 5 out of range (ticket has 2 criteria)"));
    let err = store.mark_criteria("t1", &[-1], true).unwrap_err();
    assert!(err.to_string().contains("invalid index: -1"));
    assert!(store.get("t1").unwrap().criteria.iter().all(|c| !c.met));

    assert!(store.mark_criteria("t1", &[], true).is_err());
    assert!(store.mark_criteria("bare", &[0], true).is_err());

    store.mark_criteria("t1", &[0, 1], true).unwrap();
    store.mark_criteria("t1", &[1], false).unwrap();
    let met: Vec<bool> = store.get("t1").unwrap().criteria.iter().map(|c| c.met).collect();
    assert_eq!(met, vec![true, false]);
}

#[test]
fn reset_clears_progress_and_review() {
    let tmp = TempDir::new().unwrap();
    let store = TicketStore::new(tmp.path());
    store.create(new_ticket("t1", &["a"])).unwrap();
    store.mark_criteria("t1", &[0], true).unwrap();
    let verify = TicketUpdate {
        status: Some(Status::Verify),
        notes: Some("n".into()),
        ..TicketUpdate::default()
    };
    store.update("t1", &verify, None).unwrap();

    let ticket = store.reset("t1").unwrap();
    assert_eq!(ticket.status(), Status::Todo);
    assert_eq!(ticket.progress.notes, "");
    assert!(!ticket.criteria[0].met);
    assert_eq!(store.get("t1").unwrap(), ticket);
}

// ---------------------------------------------------------------------------
// Tool server
// ---------------------------------------------------------------------------

async fn call(server: &TicketServer, name: &str, arguments: Value) -> (String, bool) {
    let outcome = server.call_tool(name, &arguments).await.unwrap();
    (outcome.text, outcome.is_error)
}

#[tokio::test]
async fn tool_server_messages() {
    let tmp = TempDir::new().unwrap();
    let server = TicketServer::new(TicketStore::new(tmp.path()), None);

    let created = call(
        &server,
        "create_ticket",
        json!({"id": " G1_1 ", "title": "T", "description": "D", "criteria": ["c"]}),
    )
    .await;
    assert_eq!(created, ("Ticket 'G1_1' created".to_string(), false));

    let (text, _) = call(&server, "list_tickets", json!({})).await;
    assert_eq!(
        serde_json::from_str::<Value>(&text).unwrap(),
        json!([{"id": "G1_1", "status": "todo"}])
    );

    let (text, _) = call(&server, "get_ticket", json!({"ticket_id": "G1_1"})).await;
    assert_eq!(serde_json::from_str::<Value>(&text).unwrap()["ticket"]["title"], "T");

    let updated = call(
        &server,
        "update_ticket",
        json!({"ticket_id": "G1_1", "status": "in_progress", "notes": "started"}),
    )
    .await;
    assert_eq!(updated, ("Ticket 'G1_1' updated: status, notes".to_string(), false));

    let nothing = call(&server, "update_ticket", json!({"ticket_id": "G1_1"})).await;
    assert_eq!(nothing.0, "No fields to update");

    let marked = call(
        &server,
        "mark_criteria",
        json!({"ticket_id": "G1_1", "indices": [0]}),
    )
    .await;
    assert_eq!(marked.0, "Ticket 'G1_1' criteria updated: indices [0] -> met=true");

    let reset = call(&server, "reset_ticket", json!({"ticket_id": "G1_1"})).await;
    assert_eq!(reset.0, "Ticket 'G1_1' reset to todo");

    let deleted = call(&server, "delete_ticket", json!({"ticket_id": "G1_1"})).await;
    assert_eq!(deleted.0, "Ticket 'G1_1' deleted");

    let (text, is_error) = call(&server, "get_ticket", json!({"ticket_id": "G1_1"})).await;
    assert!(is_error);
    assert!(text.contains("not found"));
}

#[tokio::test]
async fn tool_server_reports_bad_arguments_as_tool_errors() {
    let tmp = TempDir::new().unwrap();
    let server = TicketServer::new(TicketStore::new(tmp.path()), None);
    call(&server, "create_ticket", json!({"id": "t1", "title": "T", "description": "D"})).await;

    let (text, is_error) = call(
        &server,
        "update_ticket",
        json!({"ticket_id": "t1", "status": "done"}),
    )
    .await;
    assert!(is_error);
    assert!(text.contains("invalid arguments"));

    let (text, is_error) = call(&server, "explode", json!({})).await;
    assert!(is_error);
    assert_eq!(text, "Unknown tool: \"explode\"");
}

#[tokio::test]
async fn tool_server_role_gating() {
    let tmp = TempDir::new().unwrap();
    let store = TicketStore::new(tmp.path());
    store.create(new_ticket("t1", &[])).unwrap();
    let worker = TicketServer::new(store, Some(Role::Worker));

    let (text, is_error) = call(
        &worker,
        "create_ticket",
        json!({"id": "t2", "title": "T", "description": "D"}),
    )
    .await;
    assert!(is_error);
    assert_eq!(text, "role \"worker\" cannot use tool \"create_ticket\"");

    let (text, is_error) = call(
        &worker,
        "update_ticket",
        json!({"ticket_id": "t1", "feedback": "lgtm"}),
    )
    .await;
    assert!(is_error);
    assert!(text.contains("cannot update fields"));

    let (_, is_error) = call(
        &worker,
        "update_ticket",
        json!({"ticket_id": "t1", "status": "verify"}),
    )
    .await;
    assert!(!is_error);
}

#[tokio::test]
async fn stdio_transport_round_trip() {
    let tmp = TempDir::new().unwrap();
    let server = TicketServer::new(TicketStore::new(tmp.path()), Some(Role::Orchestrator));

    let input = [
        r#"{"jsonrpc":"2.0","id":1,"method":"tools/list"}"#,
        "",
        "garbage",
        r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
        r#"{"jsonrpc":"2.0","id":2,"method":"tools/call","params":{"name":"list_tickets","arguments":{}}}"#,
    ]
    .join("\n");
    let mut output = Vec::new();
    serve_lines(&server, BufReader::new(input.as_bytes()), &mut output)
        .await
        .unwrap();

    let replies: Vec<Value> = String::from_utf8(output)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(replies.len(), 2);
    assert_eq!(replies[0]["id"], 1);
    assert_eq!(replies[0]["result"]["tools"].as_array().unwrap().len(), 7);
    assert_eq!(replies[1]["result"]["content"][0]["text"], "[]");
}

#[test]
fn tool_calls_work_from_a_blocking_context() {
    let tmp = TempDir::new().unwrap();
    let server = TicketServer::new(TicketStore::new(tmp.path()), None);
    let outcome = tokio_test::block_on(server.call_tool("list_tickets", &json!({}))).unwrap();
    assert_eq!(outcome.text, "[]");
}
