use chrono::{TimeZone, Utc};
use serde_json::json;
use std::sync::Arc;
use tilly_core::cards::{Card, CardList};
use tilly_core::drag::{DragMachine, DropDestination};
use tilly_core::lists::{List, ListGroup, ListGroupOption, ListStage, View, ViewOptions};
use tilly_core::memory::{MemoryStore, RecordingChat, RecordingFeedback, RecordingPush, RecordingQueue};
use tilly_core::notifications::{ChannelOutcome, NotificationQuery, NotificationService, NOTIFY_DELAY};
use tilly_core::preferences::{PreferenceService, PreferenceUpsert};
use tilly_core::reorder::{plan_drop, DropRequest, ReorderService};
use tilly_shared::{NotificationChannel, NotificationEvent, NotificationType, PreferenceConfig};

fn card(id: i64, order: f64) -> Card {
    let now = Utc::now();
    Card {
        id,
        workspace_id: 1,
        type_id: None,
        parent_id: None,
        data: serde_json::Map::new(),
        card_lists: vec![CardList { id: 100 + id, card_id: id, list_id: 1, list_stage_id: 1, order }],
        created_at: now,
        updated_at: now,
    }
}

fn board() -> (List, ListGroup, View) {
    let list = List {
        id: 1,
        workspace_id: 1,
        name: "Leads".to_string(),
        default_card_type_id: None,
        list_stages: vec![ListStage {
            id: 1,
            list_id: 1,
            name: "New".to_string(),
            color: None,
            order: 1.0,
            is_completed: false,
        }],
    };
    let group = ListGroup {
        id: 5,
        list_id: 1,
        name: "All".to_string(),
        group_type: ListGroupOption::All,
        entity_id: None,
        entity_type: None,
        field: None,
        filter: None,
        is_expanded: true,
        order: 0.0,
    };
    let view = View {
        id: 9,
        list_id: 1,
        name: "Board".to_string(),
        options: ViewOptions::default(),
        filters: None,
    };
    (list, group, view)
}

#[tokio::test]
async fn test_client_and_server_drops_agree() {
    let (list, group, view) = board();
    let store = Arc::new(MemoryStore::new());
    store.put_list(list.clone());
    store.put_group(group.clone());
    store.put_view(view.clone());
    for (id, order) in [(1, 1000.0), (2, 2000.0), (3, 3000.0), (4, 4000.0)] {
        store.put_card(card(id, order));
    }

    // Client side: the machine produces the drop, the plan is computed locally.
    let mut machine = DragMachine::new(&view);
    machine.start(4).unwrap();
    machine.on_move().unwrap();
    let drop = machine.drop_within(1).unwrap();
    let post_drop = vec![card(1, 1000.0), card(4, 4000.0), card(2, 2000.0), card(3, 3000.0)];
    let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    let client_plan = plan_drop(&list, &group, &post_drop, &drop, &now).unwrap();

    // Server side: the same gesture against stored data.
    let service = ReorderService::new(
        store.clone(),
        store.clone(),
        store.clone(),
        Arc::new(RecordingFeedback::default()),
    );
    let outcome = service
        .handle_drop(
            DropRequest {
                list_id: 1,
                group_id: 5,
                view_id: 9,
                card_id: 4,
                new_index: 1,
                destination: DropDestination::SameGroup,
            },
            &now.fixed_offset(),
        )
        .await
        .unwrap();

    assert_eq!(outcome.card_list.order, client_plan.plan.order());
    let ids: Vec<i64> = service.group_cards(1, 5, 9).await.unwrap().iter().map(|c| c.id).collect();
    assert_eq!(ids, vec![1, 4, 2, 3]);
}

#[tokio::test]
async fn test_queued_event_fans_out_per_preference() {
    let store = Arc::new(MemoryStore::new());
    let push = Arc::new(RecordingPush::default());
    let chat = Arc::new(RecordingChat::default());
    let queue = Arc::new(RecordingQueue::default());
    let preferences = PreferenceService::new(store.clone());

    // User 2 muted in-app but wants DMs; user 3 keeps the defaults.
    preferences
        .upsert(&PreferenceUpsert {
            user_id: 2,
            channel: NotificationChannel::InApp,
            enabled: false,
            config: PreferenceConfig::default(),
        })
        .await
        .unwrap();
    preferences
        .upsert(&PreferenceUpsert {
            user_id: 2,
            channel: NotificationChannel::Slack,
            enabled: true,
            config: PreferenceConfig { is_dm_enabled: true, channel_id: None },
        })
        .await
        .unwrap();

    let service = NotificationService::new(store.clone(), preferences, push.clone(), chat.clone()).with_queue(queue.clone());
    let event = NotificationEvent {
        workspace_id: 1,
        actor_id: Some(1),
        recipient_ids: vec![1, 2, 3],
        related_resource_id: "17".to_string(),
        related_resource_type: "card".to_string(),
        title: "Card assigned".to_string(),
        message: "You were assigned to Acme renewal".to_string(),
        color: None,
        url: Some("/cards/17".to_string()),
    };
    service.add_to_queue(NotificationType::CardAssigned, event).await.unwrap();

    let jobs = queue.jobs();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].1, NOTIFY_DELAY);
    assert_eq!(
        serde_json::to_value(&jobs[0].0).unwrap()["type"],
        json!("CARD_ASSIGNED")
    );

    let reports = service.process_job(&jobs[0].0).await;
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].recipient_id, 2);
    assert_eq!(reports[0].in_app, ChannelOutcome::Skipped);
    assert_eq!(reports[0].chat, ChannelOutcome::Delivered);
    assert_eq!(reports[1].in_app, ChannelOutcome::Delivered);
    assert_eq!(reports[1].chat, ChannelOutcome::Skipped);

    assert_eq!(chat.sent().len(), 1);
    assert_eq!(chat.sent()[0].url.as_deref(), Some("/cards/17"));
    let pushed: Vec<i64> = push.pushed().iter().map(|(user, _)| *user).collect();
    assert_eq!(pushed, vec![3]);

    let inbox = service
        .find_all(&NotificationQuery { recipient_id: 3, workspace_id: 1, is_read: Some(false) })
        .await
        .unwrap();
    assert_eq!(inbox.len(), 1);
    assert_eq!(service.mark_all_as_read(3).await.unwrap(), 1);
}
