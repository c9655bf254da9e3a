use std::time::Duration;

use ember_model::ModelMessage;
use ember_test_model::{PresetEvent, PresetResponse, TestModelProvider};
use serde_json::json;

use crate::conversation::HISTORY_KEY;
use crate::store::MemoryStore;
use crate::{
    Controller, EMPTY_INPUT_NOTICE, Error, Message, ModelClient, Notification,
    RetryPolicy, Store, SubmitOutcome, UiRequest,
};

type TestController = Controller<MemoryStore, Vec<Notification>>;

async fn controller_with(
    model_provider: &TestModelProvider,
    store: &MemoryStore,
) -> TestController {
    let model_client = ModelClient::new(model_provider.clone())
        .with_retry_policy(Some(RetryPolicy {
            initial_interval: Duration::from_millis(1),
            max_interval: Duration::from_millis(2),
            max_elapsed_time: Duration::from_secs(5),
        }));
    Controller::load(store.clone(), vec![], model_client)
        .await
        .unwrap()
}

fn add(message: Message) -> Notification {
    Notification::AddMessage { message }
}

fn update(text: &str) -> Notification {
    Notification::UpdateStreamingText {
        text: text.to_owned(),
    }
}

#[tokio::test]
async fn test_simple_exchange() {
    let mut model_provider = TestModelProvider::default();
    model_provider.add_response(PresetResponse::with_deltas(["4"]));
    let store = MemoryStore::default();
    let mut controller = controller_with(&model_provider, &store).await;

    let outcome = controller.submit("2+2?").await.unwrap();
    assert_eq!(outcome, SubmitOutcome::Completed(Message::assistant("4")));
    assert_eq!(
        controller.conversation().messages(),
        [Message::user("2+2?"), Message::assistant("4")]
    );
    // One write per appended message.
    assert_eq!(store.writes(), 2);
    assert_eq!(
        controller.renderer(),
        &vec![
            add(Message::user("2+2?")),
            Notification::StartTyping,
            update("4"),
            Notification::StopTyping,
            Notification::FinalizeMessage {
                message: Message::assistant("4"),
            },
        ]
    );
    assert_eq!(
        store.get(HISTORY_KEY).await.unwrap(),
        Some(json!([
            { "role": "user", "content": "2+2?" },
            { "role": "assistant", "content": "4" },
        ]))
    );
}

#[tokio::test]
async fn test_streaming_accumulation() {
    let mut model_provider = TestModelProvider::default();
    model_provider
        .add_response(PresetResponse::with_deltas(["Hel", "lo", " world"]));
    let store = MemoryStore::default();
    let mut controller = controller_with(&model_provider, &store).await;

    controller.submit("Say hello").await.unwrap();
    let updates: Vec<_> = controller
        .renderer()
        .iter()
        .filter_map(|n| match n {
            Notification::UpdateStreamingText { text } => Some(text.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(updates, ["Hel", "Hello", "Hello world"]);
    assert_eq!(
        controller.conversation().messages().last(),
        Some(&Message::assistant("Hello world"))
    );
}

#[tokio::test]
async fn test_user_message_sent_with_history() {
    let mut model_provider = TestModelProvider::default();
    model_provider.add_response(PresetResponse::with_deltas(["4"]));
    model_provider.add_response(PresetResponse::with_deltas(["8"]));
    let store = MemoryStore::default();
    let mut controller = controller_with(&model_provider, &store).await;

    controller.submit("  2+2?\n").await.unwrap();
    controller.submit("and 4+4?").await.unwrap();

    let requests = model_provider.requests();
    assert_eq!(requests.len(), 2);
    // The input is trimmed and already part of the request.
    assert_eq!(
        requests[0].messages,
        [ModelMessage::User("2+2?".to_owned())]
    );
    assert_eq!(
        requests[1].messages,
        [
            ModelMessage::User("2+2?".to_owned()),
            ModelMessage::Assistant("4".to_owned()),
            ModelMessage::User("and 4+4?".to_owned()),
        ]
    );
}

#[tokio::test]
async fn test_blank_input_rejected() {
    let model_provider = TestModelProvider::default();
    let store = MemoryStore::default();
    let mut controller = controller_with(&model_provider, &store).await;

    for text in ["", "   ", "\n\t"] {
        let outcome = controller.submit(text).await.unwrap();
        assert_eq!(outcome, SubmitOutcome::Rejected);
    }
    assert!(controller.conversation().is_empty());
    assert_eq!(store.writes(), 0);
    assert!(model_provider.requests().is_empty());
    let notice = Notification::Error {
        text: EMPTY_INPUT_NOTICE.to_owned(),
    };
    assert_eq!(controller.renderer(), &vec![notice; 3]);
}

#[tokio::test]
async fn test_stream_interrupted() {
    let mut model_provider = TestModelProvider::default();
    model_provider.add_response(PresetResponse::with_events([
        PresetEvent::MessageDelta("Hel".to_owned()),
        PresetEvent::Error("connection reset".to_owned()),
    ]));
    model_provider.add_response(PresetResponse::with_deltas(["fine"]));
    let store = MemoryStore::default();
    let mut controller = controller_with(&model_provider, &store).await;

    let outcome = controller.submit("Hi").await.unwrap();
    let error_turn = Message::assistant("Error: connection reset");
    assert_eq!(outcome, SubmitOutcome::Failed(error_turn.clone()));
    assert_eq!(
        controller.conversation().messages(),
        [Message::user("Hi"), error_turn.clone()]
    );
    assert_eq!(store.writes(), 2);
    assert_eq!(
        controller.renderer(),
        &vec![
            add(Message::user("Hi")),
            Notification::StartTyping,
            update("Hel"),
            add(error_turn),
            Notification::StopTyping,
        ]
    );

    // The failure is not sticky.
    let outcome = controller.submit("Again").await.unwrap();
    assert_eq!(outcome, SubmitOutcome::Completed(Message::assistant("fine")));
    assert_eq!(controller.conversation().len(), 4);
}

#[tokio::test]
async fn test_request_failed() {
    // No presets, so the request itself fails.
    let model_provider = TestModelProvider::default();
    let store = MemoryStore::default();
    let mut controller = controller_with(&model_provider, &store).await;

    let outcome = controller.submit("Hi").await.unwrap();
    let error_turn = Message::assistant("Error: no more preset responses");
    assert_eq!(outcome, SubmitOutcome::Failed(error_turn.clone()));
    assert_eq!(
        controller.renderer(),
        &vec![
            add(Message::user("Hi")),
            add(error_turn),
            Notification::StopTyping,
        ]
    );
}

#[tokio::test]
async fn test_connection_failures_retried() {
    let mut model_provider = TestModelProvider::default();
    model_provider
        .add_response(PresetResponse::with_deltas(["4"]).with_failures(2));
    let store = MemoryStore::default();
    let mut controller = controller_with(&model_provider, &store).await;

    let outcome = controller.submit("2+2?").await.unwrap();
    assert_eq!(outcome, SubmitOutcome::Completed(Message::assistant("4")));
    assert_eq!(model_provider.requests().len(), 3);
    // Retries are invisible to the conversation.
    assert_eq!(controller.conversation().len(), 2);
    assert_eq!(store.writes(), 2);
}

#[tokio::test]
async fn test_clear_is_idempotent() {
    let mut model_provider = TestModelProvider::default();
    model_provider.add_response(PresetResponse::with_deltas(["4"]));
    let store = MemoryStore::default();
    let mut controller = controller_with(&model_provider, &store).await;
    controller.submit("2+2?").await.unwrap();

    controller.clear().await.unwrap();
    assert!(controller.conversation().is_empty());
    assert_eq!(store.get(HISTORY_KEY).await.unwrap(), Some(json!([])));

    controller.clear().await.unwrap();
    assert!(controller.conversation().is_empty());
    assert_eq!(store.get(HISTORY_KEY).await.unwrap(), Some(json!([])));
    assert_eq!(
        controller.renderer().iter().rev().take(2).collect::<Vec<_>>(),
        [&Notification::ClearMessages, &Notification::ClearMessages]
    );
}

#[tokio::test]
async fn test_persistence_failure() {
    let mut model_provider = TestModelProvider::default();
    model_provider.add_response(PresetResponse::with_deltas(["4"]));
    let store = MemoryStore::default();
    let mut controller = controller_with(&model_provider, &store).await;
    store.set_fail_writes(true);

    let err = controller.submit("2+2?").await.unwrap_err();
    assert!(matches!(err, Error::Unavailable(_)));
    // Nothing is announced and the model is never asked.
    assert!(controller.renderer().is_empty());
    assert!(model_provider.requests().is_empty());

    let err = controller.clear().await.unwrap_err();
    assert!(matches!(err, Error::Unavailable(_)));
    assert!(controller.renderer().is_empty());
}

#[tokio::test]
async fn test_restore_history() {
    let store = MemoryStore::default();
    store
        .update(
            HISTORY_KEY,
            json!([
                { "role": "user", "content": "2+2?" },
                { "role": "assistant", "content": "4" },
            ]),
        )
        .await
        .unwrap();
    let mut model_provider = TestModelProvider::default();
    model_provider.add_response(PresetResponse::with_deltas(["8"]));
    let mut controller = controller_with(&model_provider, &store).await;

    assert_eq!(controller.conversation().len(), 2);
    assert!(controller.renderer().is_empty());
    controller.restore();
    assert_eq!(
        controller.renderer(),
        &vec![add(Message::user("2+2?")), add(Message::assistant("4"))]
    );

    controller.submit("and 4+4?").await.unwrap();
    assert_eq!(model_provider.requests()[0].messages.len(), 3);
}

#[tokio::test]
async fn test_handle_requests() {
    let mut model_provider = TestModelProvider::default();
    model_provider.add_response(PresetResponse::with_deltas(["4"]));
    let store = MemoryStore::default();
    let mut controller = controller_with(&model_provider, &store).await;

    controller
        .handle(UiRequest::Chat {
            text: "2+2?".to_owned(),
        })
        .await
        .unwrap();
    assert_eq!(controller.conversation().len(), 2);

    controller.handle(UiRequest::ClearHistory).await.unwrap();
    assert!(controller.conversation().is_empty());
    assert_eq!(
        controller.renderer().last(),
        Some(&Notification::ClearMessages)
    );
}
