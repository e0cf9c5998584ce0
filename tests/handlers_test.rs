mod common;

use chrono::{Duration as ChronoDuration, Utc};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use common::{record, ChatCall, RecordingChat, RecordingNotion};
use notion_relay::chat::MessageRef;
use notion_relay::config::Fields;
use notion_relay::format;
use notion_relay::handlers::{ApproveOutcome, CallbackEvent, Command, Relay};
use notion_relay::model::{ActionButton, ActionTag, ButtonLayout, CallbackAction, Checkpoint};
use notion_relay::notion::FilterKind;
use notion_relay::poller::Poller;

const CHAT: i64 = 42;

fn relay(notion: &Arc<RecordingNotion>, chat: &Arc<RecordingChat>) -> Relay {
    let poller = Arc::new(Poller::new(
        notion.clone(),
        chat.clone(),
        5,
        Checkpoint::new(Utc::now() - ChronoDuration::days(7)),
    ));
    Relay::new(notion.clone(), chat.clone(), poller, Fields::default(), 5)
}

fn origin() -> MessageRef {
    MessageRef {
        chat_id: CHAT,
        message_id: 7,
    }
}

fn approve_event(buttons: Option<ButtonLayout>) -> CallbackEvent {
    CallbackEvent {
        id: "cb-1".into(),
        data: Some("approve:abc".into()),
        message: Some(origin()),
        buttons,
    }
}

fn sent_layout() -> ButtonLayout {
    format::buttons_for(&record("abc", Some("My Note"), Utc::now()))
}

#[tokio::test]
async fn approve_schedules_and_drops_the_button() {
    let notion = Arc::new(RecordingNotion::default());
    let chat = Arc::new(RecordingChat::default());

    relay(&notion, &chat)
        .handle_callback(approve_event(Some(sent_layout())))
        .await
        .unwrap();

    assert_eq!(
        notion.updates().await,
        vec![("abc".to_string(), notion_relay::model::Status::Scheduled)]
    );
    let calls = chat.calls().await;
    assert_eq!(calls[0], ChatCall::Answer("cb-1".into()));
    match &calls[1] {
        ChatCall::EditButtons { target, buttons } => {
            assert_eq!(*target, origin());
            let buttons = buttons.as_ref().expect("link button kept");
            assert!(!buttons.buttons().any(|b| matches!(
                b,
                ActionButton::Callback { action, .. } if action.tag == ActionTag::Approve
            )));
            assert!(buttons.buttons().any(|b| matches!(
                b,
                ActionButton::Link { label, url } if label == "View full content" && url == "https://x/abc"
            )));
        }
        other => panic!("expected button edit, got {other:?}"),
    }
    assert_eq!(
        calls[2],
        ChatCall::Text {
            chat_id: CHAT,
            text: "Item scheduled successfully!".into()
        }
    );
}

#[tokio::test]
async fn approve_without_link_removes_all_buttons() {
    let notion = Arc::new(RecordingNotion::default());
    let chat = Arc::new(RecordingChat::default());
    let only_approve = ButtonLayout::new(vec![vec![ActionButton::Callback {
        label: "✅ Approve".into(),
        action: CallbackAction::approve("abc"),
    }]]);

    let outcome = relay(&notion, &chat)
        .approve(Some(origin()), Some(&only_approve), "abc")
        .await
        .unwrap();

    assert_eq!(outcome, ApproveOutcome::Scheduled);
    assert!(chat.calls().await.contains(&ChatCall::EditButtons {
        target: origin(),
        buttons: None
    }));
}

#[tokio::test]
async fn failed_approve_leaves_buttons_untouched() {
    let notion = Arc::new(RecordingNotion::default());
    notion.fail_updates.store(true, Ordering::SeqCst);
    let chat = Arc::new(RecordingChat::default());

    relay(&notion, &chat)
        .handle_callback(approve_event(Some(sent_layout())))
        .await
        .unwrap();

    let calls = chat.calls().await;
    assert!(!calls
        .iter()
        .any(|c| matches!(c, ChatCall::EditButtons { .. })));
    assert_eq!(
        chat.texts().await,
        vec!["Failed to schedule item. Please try again later.".to_string()]
    );
}

#[tokio::test]
async fn unknown_callback_is_answered_and_ignored() {
    let notion = Arc::new(RecordingNotion::default());
    let chat = Arc::new(RecordingChat::default());

    relay(&notion, &chat)
        .handle_callback(CallbackEvent {
            id: "cb-2".into(),
            data: Some("send_to_channel:abc".into()),
            message: Some(origin()),
            buttons: None,
        })
        .await
        .unwrap();

    assert!(notion.updates().await.is_empty());
    assert_eq!(chat.calls().await, vec![ChatCall::Answer("cb-2".into())]);
}

#[tokio::test]
async fn quote_with_no_results() {
    let notion = Arc::new(RecordingNotion::default());
    let chat = Arc::new(RecordingChat::default());

    relay(&notion, &chat)
        .handle_command(CHAT, Command::Quote)
        .await
        .unwrap();

    assert_eq!(
        chat.texts().await,
        vec!["No quotes found in the database.".to_string()]
    );
    let filters = notion.filters.lock().await.clone();
    assert_eq!(filters.len(), 1);
    assert_eq!(filters[0].property, "Type");
    assert_eq!(filters[0].kind, FilterKind::Select);
    assert_eq!(filters[0].value, "Quote");
}

#[tokio::test]
async fn quote_is_rendered_with_author() {
    let notion = Arc::new(RecordingNotion::default());
    let mut quote = record("q1", None, Utc::now());
    quote
        .text_properties
        .insert("Content".into(), "Stay hungry".into());
    quote.text_properties.insert("Author".into(), "Jobs".into());
    notion.quotes.lock().await.push(quote);
    let chat = Arc::new(RecordingChat::default());

    let text = relay(&notion, &chat).random_quote().await;
    assert_eq!(text, "\"Stay hungry\" - Jobs");
}

#[tokio::test]
async fn quote_errors_become_a_message() {
    let notion = Arc::new(RecordingNotion::default());
    notion.fail_queries.store(true, Ordering::SeqCst);
    let chat = Arc::new(RecordingChat::default());
    assert_eq!(
        relay(&notion, &chat).random_quote().await,
        "Error fetching quote."
    );

    let notion = Arc::new(RecordingNotion::default());
    notion
        .quotes
        .lock()
        .await
        .push(record("q2", None, Utc::now()));
    assert_eq!(
        relay(&notion, &chat).random_quote().await,
        "Error fetching quote."
    );
}

#[tokio::test]
async fn check_replies_when_nothing_is_new() {
    let notion = Arc::new(RecordingNotion::default());
    let chat = Arc::new(RecordingChat::default());

    relay(&notion, &chat)
        .handle_command(CHAT, Command::Check)
        .await
        .unwrap();

    assert_eq!(chat.texts().await, vec!["No new items found.".to_string()]);
}

#[tokio::test]
async fn check_sends_items_to_the_caller() {
    let edited = Utc::now() - ChronoDuration::hours(2);
    let notion = Arc::new(RecordingNotion::with_done(vec![record("abc", Some("My Note"), edited)]).await);
    notion.set_content("abc", &["hello"]).await;
    let chat = Arc::new(RecordingChat::default());

    relay(&notion, &chat)
        .handle_command(CHAT, Command::Check)
        .await
        .unwrap();

    let calls = chat.calls().await;
    assert_eq!(calls.len(), 1);
    assert!(matches!(&calls[0], ChatCall::Html { chat_id, text, .. }
        if *chat_id == CHAT && text.contains("<blockquote>hello</blockquote>")));
}

#[tokio::test]
async fn check_reports_query_failure() {
    let notion = Arc::new(RecordingNotion::default());
    notion.fail_queries.store(true, Ordering::SeqCst);
    let chat = Arc::new(RecordingChat::default());

    relay(&notion, &chat)
        .handle_command(CHAT, Command::Check)
        .await
        .unwrap();

    assert_eq!(
        chat.texts().await,
        vec!["Failed to query Notion. Please try again later.".to_string()]
    );
}

#[tokio::test]
async fn view_scheduled_renders_with_content() {
    let notion = Arc::new(RecordingNotion::default());
    notion
        .scheduled
        .lock()
        .await
        .push(record("s1", Some("Queued"), Utc::now()));
    notion.set_content("s1", &["later"]).await;
    let chat = Arc::new(RecordingChat::default());

    relay(&notion, &chat)
        .handle_command(CHAT, Command::ViewScheduled)
        .await
        .unwrap();

    let html = chat.html().await;
    assert_eq!(html.len(), 1);
    assert!(html[0].contains("<b>Queued</b>"));
    assert!(html[0].contains("<blockquote>later</blockquote>"));
}

#[tokio::test]
async fn view_scheduled_when_empty() {
    let notion = Arc::new(RecordingNotion::default());
    let chat = Arc::new(RecordingChat::default());

    relay(&notion, &chat)
        .handle_command(CHAT, Command::ViewScheduled)
        .await
        .unwrap();

    assert_eq!(
        chat.texts().await,
        vec!["No scheduled items found.".to_string()]
    );
}

#[tokio::test]
async fn simple_replies() {
    let notion = Arc::new(RecordingNotion::default());
    let chat = Arc::new(RecordingChat::default());
    let relay = relay(&notion, &chat);

    relay.handle_command(CHAT, Command::GetChatId).await.unwrap();
    relay.handle_command(CHAT, Command::Schema).await.unwrap();
    notion.fail_queries.store(true, Ordering::SeqCst);
    relay.handle_command(CHAT, Command::Schema).await.unwrap();

    assert_eq!(
        chat.texts().await,
        vec![
            "Your chat ID is: 42".to_string(),
            "Database schema printed to console.".to_string(),
            "Database schema printed to console.".to_string(),
        ]
    );
}
