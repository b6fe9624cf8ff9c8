//! TaskState construction and transition tests

use engine_core::{ChatMessage, Choices, MessageRole, Sample, TaskState, TaskStateOptions};
use serde_json::json;

#[test]
fn test_text_input_builds_single_user_message() {
    let state = TaskState::new(Sample::new("q", "X"), TaskStateOptions::new()).unwrap();

    assert_eq!(state.messages().len(), 1);
    assert_eq!(state.messages()[0].role, MessageRole::User);
    assert_eq!(state.messages()[0].content, "X");
    assert_eq!(state.input_text().unwrap(), "X");
}

#[test]
fn test_sequential_appends_keep_order() {
    let mut state = TaskState::new(Sample::new("q", "X"), TaskStateOptions::new()).unwrap();
    let initial = state.messages().len();

    for i in 0..5 {
        state = state.add_message(ChatMessage::assistant(format!("reply {}", i)));
    }

    assert_eq!(state.messages().len(), initial + 5);
    let contents: Vec<&str> = state.messages()[initial..]
        .iter()
        .map(|m| m.content.as_str())
        .collect();
    assert_eq!(contents, vec!["reply 0", "reply 1", "reply 2", "reply 3", "reply 4"]);
}

#[test]
fn test_complete_is_idempotent() {
    let state = TaskState::new(Sample::new("q", "X"), TaskStateOptions::new()).unwrap();

    let once = state.complete();
    let twice = once.clone().complete();

    assert!(once.completed());
    assert!(twice.completed());
    assert_eq!(once.to_record().unwrap(), twice.to_record().unwrap());
}

#[test]
fn test_complete_changes_nothing_else() {
    let state = TaskState::new(Sample::new("q", "X"), TaskStateOptions::new())
        .unwrap()
        .with_store_value("k", json!(1));
    let mut before = state.to_record().unwrap();
    let mut after = state.complete().to_record().unwrap();

    before["completed"] = json!(null);
    after["completed"] = json!(null);
    assert_eq!(before, after);
}

#[test]
fn test_sample_choices_are_loaded_in_order() {
    let sample = Sample::new("q", "Pick one").with_choices(["red", "green", "blue"]);
    let state = TaskState::new(sample, TaskStateOptions::new()).unwrap();

    let values: Vec<&str> = state.choices().iter().map(|c| c.value.as_str()).collect();
    assert_eq!(values, vec!["red", "green", "blue"]);
}

#[test]
fn test_shuffled_choices_map_back() {
    let state = TaskState::new(
        Sample::new("q", "Pick one"),
        TaskStateOptions::new().with_choices(Choices::new(["a", "b", "c", "d"])),
    )
    .unwrap();

    let shuffled = state.choices().clone().shuffle(Some(11));
    let state = state.with_choices(shuffled);

    let originals = ["a", "b", "c", "d"];
    for choice in state.choices().iter() {
        assert_eq!(originals[choice.original_position], choice.value);
    }
}

#[test]
fn test_metadata_carried_from_sample() {
    let sample = Sample::new("q", "X").with_metadata("difficulty", json!("hard"));
    let state = TaskState::new(sample, TaskStateOptions::new()).unwrap();
    assert_eq!(state.metadata()["difficulty"], "hard");
}
