//! The hosting layer ships dialogues to the browser as JSON; these tests pin the shape.

use broker_abstraction::{
    DialogueData, DialogueKind, DialogueResult, FileFilter, MessageBoxButtons, MessageBoxResult,
};
use serde_json::json;

#[test]
fn test_message_box_json_shape() {
    let dialogue = DialogueData::message_box("Delete?", "Remove the submodel?", MessageBoxButtons::OkCancel);
    let value = serde_json::to_value(&dialogue).unwrap();

    assert_eq!(value["kind"]["kind"], "message_box");
    assert_eq!(value["kind"]["caption"], "Delete?");
    assert_eq!(value["kind"]["buttons"], "OkCancel");
    assert_eq!(value["result"], serde_json::Value::Null);
}

#[test]
fn test_client_answer_parses_from_json() {
    let answer: DialogueResult =
        serde_json::from_value(json!({"result": "button", "value": "Cancel"})).unwrap();
    assert_eq!(answer, DialogueResult::Button(MessageBoxResult::Cancel));

    let dismissed: DialogueResult = serde_json::from_value(json!({"result": "cancelled"})).unwrap();
    assert!(dismissed.is_cancelled());
}

#[test]
fn test_save_file_defaults_when_fields_missing() {
    let kind: DialogueKind =
        serde_json::from_value(json!({"kind": "save_file", "title": "Save AASX"})).unwrap();
    match kind {
        DialogueKind::SaveFile { title, filters, initial_directory, proposed_file_name } => {
            assert_eq!(title, "Save AASX");
            assert!(filters.is_empty());
            assert!(initial_directory.is_none());
            assert!(proposed_file_name.is_none());
        }
        other => panic!("Expected SaveFile, got {:?}", other),
    }
}

#[test]
fn test_open_file_carries_filters() {
    let dialogue = DialogueData::open_file("Open", vec![FileFilter::new("AASX package", "*.aasx")]);
    let value = serde_json::to_value(&dialogue).unwrap();
    assert_eq!(value["kind"]["filters"][0]["pattern"], "*.aasx");
    assert_eq!(dialogue.kind_name(), "open_file");
}
