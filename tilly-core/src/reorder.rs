//! Turns completed drag gestures into persisted order, stage and field changes.

use chrono::{DateTime, FixedOffset, TimeZone};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

use crate::cards::{group_members, Card, CardList, CardListUpdate};
use crate::drag::{CardDrop, DragError, DragMachine, DropDestination};
use crate::feedback::{Feedback, FeedbackLevel, GENERIC_FAILURE_MESSAGE};
use crate::fields::{normalize_field_value, Field};
use crate::grouping::{group_query, new_card_prefill, resolve_group_stage, resolve_group_value, CardPrefill};
use crate::lists::{List, ListGroup, ListGroupOption, QueryConfig, View};
use crate::ordering::{compute_order, gap_exhausted, renumber};
use crate::repository::{CardListRepository, CardRepository, ListRepository, RepoResult};
use crate::{CoreError, CoreResult};

/// What a drop changes on the dragged card's list membership.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DropPlan {
    Reorder {
        card_list_id: i64,
        order: f64,
    },
    MoveToStage {
        card_list_id: i64,
        list_stage_id: i64,
        order: f64,
    },
    /// The group value is written through the field normaliser first, then
    /// the order is persisted on its own.
    MoveToField {
        card_id: i64,
        card_list_id: i64,
        field: Field,
        value: Value,
        order: f64,
    },
}

impl DropPlan {
    pub fn order(&self) -> f64 {
        match self {
            DropPlan::Reorder { order, .. }
            | DropPlan::MoveToStage { order, .. }
            | DropPlan::MoveToField { order, .. } => *order,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedDrop {
    pub card_id: i64,
    pub plan: DropPlan,
    /// Order rewrites for the other members when the gap at the drop
    /// position could not take another midpoint.
    pub renumbered: Vec<(i64, f64)>,
}

/// Plans a drop against the group's members as they look after the drop:
/// the dragged card already sits at `drop.new_index`.
pub fn plan_drop<Tz: TimeZone>(
    list: &List,
    group: &ListGroup,
    members: &[Card],
    drop: &CardDrop,
    now: &DateTime<Tz>,
) -> CoreResult<PlannedDrop> {
    let index = drop.new_index;
    let dragged = members.get(index).ok_or(DragError::IndexOutOfRange {
        index,
        len: members.len(),
    })?;
    if dragged.id != drop.card_id {
        return Err(CoreError::ValidationError(format!(
            "Card {} is not at position {} of group {}",
            drop.card_id, index, group.id
        )));
    }
    let card_list_id = dragged
        .card_lists
        .iter()
        .find(|cl| cl.list_id == list.id)
        .map(|cl| cl.id)
        .ok_or_else(|| CoreError::ValidationError(format!("Card {} is not in list {}", drop.card_id, list.id)))?;

    let previous = index
        .checked_sub(1)
        .and_then(|i| members.get(i))
        .and_then(|c| c.order_in(list.id));
    let next = members.get(index + 1).and_then(|c| c.order_in(list.id));

    let mut renumbered = Vec::new();
    let order = match (previous, next) {
        (Some(p), Some(n)) if gap_exhausted(p, n) => {
            let orders = renumber(members.len());
            for (member, order) in members.iter().zip(orders.iter()) {
                if member.id == drop.card_id {
                    continue;
                }
                if let Some(cl) = member.card_lists.iter().find(|cl| cl.list_id == list.id) {
                    if cl.order != *order {
                        renumbered.push((cl.id, *order));
                    }
                }
            }
            orders[index]
        }
        _ => compute_order(previous, next),
    };

    let plan = match (drop.destination, group.group_type) {
        (DropDestination::OtherGroup, ListGroupOption::ListStage) => {
            let stage = resolve_group_stage(list, group)
                .ok_or_else(|| CoreError::NotFound(format!("Stage for group {}", group.id)))?;
            DropPlan::MoveToStage {
                card_list_id,
                list_stage_id: stage.id,
                order,
            }
        }
        (DropDestination::OtherGroup, ListGroupOption::Field) => {
            let field = group
                .field
                .clone()
                .ok_or_else(|| CoreError::ValidationError(format!("Group {} has no field", group.id)))?;
            DropPlan::MoveToField {
                card_id: drop.card_id,
                card_list_id,
                value: resolve_group_value(group, now).unwrap_or(Value::Null),
                field,
                order,
            }
        }
        _ => DropPlan::Reorder { card_list_id, order },
    };

    Ok(PlannedDrop {
        card_id: drop.card_id,
        plan,
        renumbered,
    })
}

/// Maps an index among the visible cards to an index among all group members:
/// right after the visible card it follows, or right before the one it precedes.
fn member_position(members: &[Card], visible: &[i64], index: usize) -> usize {
    let position_of = |id: &i64| members.iter().position(|c| c.id == *id);
    let after = index
        .checked_sub(1)
        .and_then(|i| visible.get(i))
        .and_then(position_of)
        .map(|p| p + 1);
    let before = || visible.get(index).and_then(position_of);
    after.or_else(before).unwrap_or(members.len())
}

/// A server-side drop request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DropRequest {
    pub list_id: i64,
    pub group_id: i64,
    pub view_id: i64,
    pub card_id: i64,
    pub new_index: usize,
    pub destination: DropDestination,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DropOutcome {
    pub card_list: CardList,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub card: Option<Card>,
    pub renumbered: usize,
}

/// Applies drops and the single-row updates they are made of.
///
/// Writes are not rolled back: when a later write of a plan fails, earlier
/// ones stay persisted. Every failure is reported to the feedback sink.
#[derive(Clone)]
pub struct ReorderService {
    cards: Arc<dyn CardRepository>,
    card_lists: Arc<dyn CardListRepository>,
    lists: Arc<dyn ListRepository>,
    feedback: Arc<dyn Feedback>,
}

impl ReorderService {
    pub fn new(
        cards: Arc<dyn CardRepository>,
        card_lists: Arc<dyn CardListRepository>,
        lists: Arc<dyn ListRepository>,
        feedback: Arc<dyn Feedback>,
    ) -> Self {
        Self {
            cards,
            card_lists,
            lists,
            feedback,
        }
    }

    fn reported<T>(&self, result: RepoResult<T>) -> CoreResult<T> {
        result.map_err(|e| {
            tracing::error!("Reorder write failed: {}", e);
            self.feedback.notify(FeedbackLevel::Error, GENERIC_FAILURE_MESSAGE);
            CoreError::from(e)
        })
    }

    async fn load_list(&self, id: i64) -> CoreResult<List> {
        self.lists
            .get_list(id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("List {}", id)))
    }

    async fn load_group(&self, list_id: i64, id: i64) -> CoreResult<ListGroup> {
        self.lists
            .get_group(id)
            .await?
            .filter(|g| g.list_id == list_id)
            .ok_or_else(|| CoreError::NotFound(format!("List group {}", id)))
    }

    async fn load_view(&self, list_id: i64, id: i64) -> CoreResult<View> {
        self.lists
            .get_view(id)
            .await?
            .filter(|v| v.list_id == list_id)
            .ok_or_else(|| CoreError::NotFound(format!("View {}", id)))
    }

    pub async fn load_field(&self, id: i64) -> CoreResult<Field> {
        self.lists
            .get_field(id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("Field {}", id)))
    }

    pub async fn update_card_list(&self, card_list_id: i64, update: &CardListUpdate) -> CoreResult<CardList> {
        let updated = self.reported(self.card_lists.update_card_list(card_list_id, update).await)?;
        updated.ok_or_else(|| CoreError::NotFound(format!("Card list {}", card_list_id)))
    }

    /// Updates a membership row after checking it belongs to `card_id`.
    pub async fn update_card_membership(
        &self,
        card_id: i64,
        card_list_id: i64,
        update: &CardListUpdate,
    ) -> CoreResult<CardList> {
        let existing = self
            .card_lists
            .get_card_list(card_list_id)
            .await?
            .filter(|cl| cl.card_id == card_id)
            .ok_or_else(|| CoreError::NotFound(format!("Card list {} of card {}", card_list_id, card_id)))?;
        if let Some(stage) = update.list_stage_id {
            let list = self.load_list(existing.list_id).await?;
            if list.find_stage(stage).is_none() {
                return Err(CoreError::ValidationError(format!(
                    "Stage {} does not belong to list {}",
                    stage, list.id
                )));
            }
        }
        self.update_card_list(card_list_id, update).await
    }

    /// Normalises `value` for `field` and stores it in the card's data.
    pub async fn update_field_value(&self, card_id: i64, field: &Field, value: &Value) -> CoreResult<Card> {
        let mut card = self
            .cards
            .get_card(card_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("Card {}", card_id)))?;
        card.set_field(&field.slug, normalize_field_value(value, field));

        let updated = self.reported(self.cards.update_card_data(card_id, &card.data).await)?;
        updated.ok_or_else(|| CoreError::NotFound(format!("Card {}", card_id)))
    }

    pub async fn apply(&self, planned: &PlannedDrop) -> CoreResult<DropOutcome> {
        for (card_list_id, order) in &planned.renumbered {
            self.update_card_list(
                *card_list_id,
                &CardListUpdate {
                    list_stage_id: None,
                    order: Some(*order),
                },
            )
            .await?;
        }
        if !planned.renumbered.is_empty() {
            tracing::info!("Renumbered {} cards around card {}", planned.renumbered.len(), planned.card_id);
        }

        let (card_list, card) = match &planned.plan {
            DropPlan::Reorder { card_list_id, order } => {
                let update = CardListUpdate {
                    list_stage_id: None,
                    order: Some(*order),
                };
                (self.update_card_list(*card_list_id, &update).await?, None)
            }
            DropPlan::MoveToStage {
                card_list_id,
                list_stage_id,
                order,
            } => {
                let update = CardListUpdate {
                    list_stage_id: Some(*list_stage_id),
                    order: Some(*order),
                };
                (self.update_card_list(*card_list_id, &update).await?, None)
            }
            DropPlan::MoveToField {
                card_id,
                card_list_id,
                field,
                value,
                order,
            } => {
                let card = self.update_field_value(*card_id, field, value).await?;
                let update = CardListUpdate {
                    list_stage_id: None,
                    order: Some(*order),
                };
                (self.update_card_list(*card_list_id, &update).await?, Some(card))
            }
        };

        Ok(DropOutcome {
            card_list,
            card,
            renumbered: planned.renumbered.len(),
        })
    }

    /// Cards of a group in the order the view shows them.
    pub async fn group_cards(&self, list_id: i64, group_id: i64, view_id: i64) -> CoreResult<Vec<Card>> {
        let list = self.load_list(list_id).await?;
        let group = self.load_group(list_id, group_id).await?;
        let view = self.load_view(list_id, view_id).await?;
        let cards = self.cards.list_cards_in_list(list_id).await?;
        Ok(group_members(cards, &list, &group_query(&view, &group)))
    }

    /// Runs a whole gesture server-side: guard, post-drop sequence, plan, writes.
    pub async fn handle_drop(&self, request: DropRequest, now: &DateTime<FixedOffset>) -> CoreResult<DropOutcome> {
        let list = self.load_list(request.list_id).await?;
        let group = self.load_group(request.list_id, request.group_id).await?;
        let view = self.load_view(request.list_id, request.view_id).await?;

        let mut machine = DragMachine::new(&view);
        if let Err(e) = machine.start(request.card_id) {
            if e == DragError::SortingActive {
                self.feedback.notify(FeedbackLevel::Warning, &e.to_string());
            }
            return Err(e.into());
        }

        let cards = self.cards.list_cards_in_list(request.list_id).await?;
        let dragged = cards
            .iter()
            .find(|c| c.id == request.card_id)
            .cloned()
            .ok_or_else(|| CoreError::NotFound(format!("Card {} in list {}", request.card_id, request.list_id)))?;

        let visible: Vec<i64> = group_members(cards.clone(), &list, &group_query(&view, &group))
            .iter()
            .map(|c| c.id)
            .collect();
        if request.destination == DropDestination::SameGroup && !visible.contains(&request.card_id) {
            return Err(CoreError::ValidationError(format!(
                "Card {} is not in group {}",
                request.card_id, group.id
            )));
        }
        let visible: Vec<i64> = visible.into_iter().filter(|id| *id != request.card_id).collect();
        let index = request.new_index.min(visible.len());

        // Cards the view hides are still ordered, so the sequence covers the whole group.
        let mut members: Vec<Card> = group_members(cards, &list, &QueryConfig::for_membership(&group))
            .into_iter()
            .filter(|c| c.id != request.card_id)
            .collect();
        let position = member_position(&members, &visible, index);
        members.insert(position, dragged);

        let drop = match request.destination {
            DropDestination::SameGroup => machine.drop_within(position)?,
            DropDestination::OtherGroup => machine.drop_into(position)?,
        };
        let planned = plan_drop(&list, &group, &members, &drop, now)?;
        tracing::debug!("Planned drop of card {}: {:?}", drop.card_id, planned.plan);

        self.apply(&planned).await
    }

    pub async fn prefill(&self, list_id: i64, group_id: i64, now: &DateTime<FixedOffset>) -> CoreResult<CardPrefill> {
        let list = self.load_list(list_id).await?;
        let group = self.load_group(list_id, group_id).await?;
        Ok(new_card_prefill(&list, &group, now))
    }

    /// Flips the group's expanded flag.
    pub async fn toggle_group(&self, list_id: i64, group_id: i64) -> CoreResult<ListGroup> {
        let group = self.load_group(list_id, group_id).await?;
        let updated = self.reported(self.lists.set_group_expanded(group_id, !group.is_expanded).await)?;
        updated.ok_or_else(|| CoreError::NotFound(format!("List group {}", group_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drag::SORTING_ACTIVE_MESSAGE;
    use crate::fields::{FieldItem, FieldType};
    use crate::filters::{FieldFilter, FilterCondition, QueryFilter};
    use crate::lists::{ListStage, SortDirection, SortOption, ViewOptions};
    use crate::memory::{MemoryStore, RecordingFeedback};
    use chrono::Utc;
    use serde_json::json;

    const LIST: i64 = 1;
    const TODO_GROUP: i64 = 10;
    const DONE_GROUP: i64 = 11;
    const HIGH_GROUP: i64 = 12;
    const MANUAL_VIEW: i64 = 100;
    const SORTED_VIEW: i64 = 101;

    fn now() -> DateTime<FixedOffset> {
        Utc.with_ymd_and_hms(2024, 3, 10, 8, 0, 0).unwrap().fixed_offset()
    }

    fn card(id: i64, stage: i64, order: f64) -> Card {
        let now = Utc::now();
        Card {
            id,
            workspace_id: 1,
            type_id: None,
            parent_id: None,
            data: serde_json::Map::new(),
            card_lists: vec![CardList { id: id * 10, card_id: id, list_id: LIST, list_stage_id: stage, order }],
            created_at: now,
            updated_at: now,
        }
    }

    fn list() -> List {
        List {
            id: LIST,
            workspace_id: 1,
            name: "Pipeline".into(),
            default_card_type_id: None,
            list_stages: vec![
                ListStage { id: 1, list_id: LIST, name: "To do".into(), color: None, order: 1.0, is_completed: false },
                ListStage { id: 2, list_id: LIST, name: "Done".into(), color: None, order: 2.0, is_completed: true },
            ],
        }
    }

    fn priority() -> Field {
        Field {
            id: 7,
            slug: "priority".into(),
            name: "Priority".into(),
            field_type: FieldType::Dropdown,
            items: vec![FieldItem { item: "High".into(), color: None }],
        }
    }

    fn filter(field: &str, value: Value) -> Option<QueryFilter> {
        Some(QueryFilter::from_conditions(vec![FilterCondition::Field(FieldFilter::new(field, "eq", value))]))
    }

    fn group(id: i64, group_type: ListGroupOption, name: &str) -> ListGroup {
        ListGroup {
            id,
            list_id: LIST,
            name: name.into(),
            group_type,
            entity_id: None,
            entity_type: None,
            field: None,
            filter: None,
            is_expanded: true,
            order: 0.0,
        }
    }

    fn view(id: i64, sorted: bool) -> View {
        View {
            id,
            list_id: LIST,
            name: "Board".into(),
            options: ViewOptions {
                sort_by: sorted.then(|| SortOption { key: "title".into(), order: SortDirection::Asc }),
                ..ViewOptions::default()
            },
            filters: None,
        }
    }

    fn seeded() -> (Arc<MemoryStore>, Arc<RecordingFeedback>, ReorderService) {
        let store = Arc::new(MemoryStore::new());
        store.put_list(list());
        for (id, stage, order) in [(1, 1, 1000.0), (2, 1, 2000.0), (3, 1, 3000.0), (4, 2, 1000.0)] {
            store.put_card(card(id, stage, order));
        }

        let mut todo = group(TODO_GROUP, ListGroupOption::ListStage, "To do");
        todo.entity_id = Some(1);
        todo.filter = filter("listStage.id", json!(1));
        let mut done = group(DONE_GROUP, ListGroupOption::ListStage, "Done");
        done.entity_id = Some(2);
        done.filter = filter("listStage.id", json!(2));
        let mut high = group(HIGH_GROUP, ListGroupOption::Field, "High");
        high.field = Some(priority());
        high.filter = filter("card.data.priority", json!("High"));
        for g in [todo, done, high] {
            store.put_group(g);
        }
        store.put_view(view(MANUAL_VIEW, false));
        store.put_view(view(SORTED_VIEW, true));
        store.put_field(priority());

        let feedback = Arc::new(RecordingFeedback::default());
        let service = ReorderService::new(store.clone(), store.clone(), store.clone(), feedback.clone());
        (store, feedback, service)
    }

    fn request(group_id: i64, card_id: i64, new_index: usize, destination: DropDestination) -> DropRequest {
        DropRequest {
            list_id: LIST,
            group_id,
            view_id: MANUAL_VIEW,
            card_id,
            new_index,
            destination,
        }
    }

    fn ids(cards: &[Card]) -> Vec<i64> {
        cards.iter().map(|c| c.id).collect()
    }

    #[test]
    fn test_plan_uses_post_drop_neighbors() {
        let members = vec![card(1, 1, 1000.0), card(3, 1, 3000.0), card(2, 1, 2000.0)];
        let g = group(TODO_GROUP, ListGroupOption::ListStage, "To do");
        let drop = CardDrop { card_id: 3, new_index: 1, destination: DropDestination::SameGroup };

        let planned = plan_drop(&list(), &g, &members, &drop, &now()).unwrap();
        assert_eq!(planned.plan, DropPlan::Reorder { card_list_id: 30, order: 1500.0 });
        assert!(planned.renumbered.is_empty());
    }

    #[test]
    fn test_plan_at_the_ends() {
        let g = group(TODO_GROUP, ListGroupOption::All, "All");
        let members = vec![card(1, 1, 1000.0), card(2, 1, 2000.0), card(9, 1, 50.0)];
        let last = CardDrop { card_id: 9, new_index: 2, destination: DropDestination::SameGroup };
        assert_eq!(plan_drop(&list(), &g, &members, &last, &now()).unwrap().plan.order(), 3000.0);

        let members = vec![card(9, 1, 50.0), card(1, 1, 1000.0)];
        let first = CardDrop { card_id: 9, new_index: 0, destination: DropDestination::SameGroup };
        assert_eq!(plan_drop(&list(), &g, &members, &first, &now()).unwrap().plan.order(), 0.0);

        let alone = vec![card(9, 1, 50.0)];
        assert_eq!(plan_drop(&list(), &g, &alone, &first, &now()).unwrap().plan.order(), 1000.0);
    }

    #[test]
    fn test_plan_renumbers_exhausted_gap() {
        let g = group(TODO_GROUP, ListGroupOption::All, "All");
        let members = vec![card(1, 1, 1000.0), card(9, 1, 7.0), card(2, 1, 1000.0), card(3, 1, 5000.0)];
        let drop = CardDrop { card_id: 9, new_index: 1, destination: DropDestination::SameGroup };

        let planned = plan_drop(&list(), &g, &members, &drop, &now()).unwrap();
        assert_eq!(planned.plan.order(), 2000.0);
        assert_eq!(planned.renumbered, vec![(20, 3000.0), (30, 4000.0)]);
    }

    #[test]
    fn test_plan_for_other_groups() {
        let members = vec![card(1, 2, 1000.0)];
        let drop = CardDrop { card_id: 1, new_index: 0, destination: DropDestination::OtherGroup };

        let mut stage_group = group(TODO_GROUP, ListGroupOption::ListStage, "To do");
        stage_group.entity_id = Some(1);
        assert_eq!(
            plan_drop(&list(), &stage_group, &members, &drop, &now()).unwrap().plan,
            DropPlan::MoveToStage { card_list_id: 10, list_stage_id: 1, order: 1000.0 }
        );

        let mut field_group = group(HIGH_GROUP, ListGroupOption::Field, "High");
        field_group.field = Some(priority());
        match plan_drop(&list(), &field_group, &members, &drop, &now()).unwrap().plan {
            DropPlan::MoveToField { value, card_id, .. } => {
                assert_eq!(value, json!("High"));
                assert_eq!(card_id, 1);
            }
            other => panic!("unexpected plan {:?}", other),
        }
    }

    #[test]
    fn test_plan_rejects_bad_index() {
        let g = group(TODO_GROUP, ListGroupOption::All, "All");
        let drop = CardDrop { card_id: 1, new_index: 4, destination: DropDestination::SameGroup };
        let err = plan_drop(&list(), &g, &[card(1, 1, 1.0)], &drop, &now()).unwrap_err();
        assert!(matches!(err, CoreError::Drag(DragError::IndexOutOfRange { index: 4, len: 1 })));
    }

    #[tokio::test]
    async fn test_reorder_then_refetch_places_card_between_neighbors() {
        let (store, _, service) = seeded();
        let outcome = service
            .handle_drop(request(TODO_GROUP, 3, 1, DropDestination::SameGroup), &now())
            .await
            .unwrap();
        assert_eq!(outcome.card_list.order, 1500.0);

        let cards = service.group_cards(LIST, TODO_GROUP, MANUAL_VIEW).await.unwrap();
        assert_eq!(ids(&cards), vec![1, 3, 2]);
        let order = store.card(3).and_then(|c| c.order_in(LIST)).unwrap();
        assert!(1000.0 < order && order < 2000.0);
    }

    #[tokio::test]
    async fn test_drop_into_stage_group_moves_stage() {
        let (_, _, service) = seeded();
        let outcome = service
            .handle_drop(request(DONE_GROUP, 1, 0, DropDestination::OtherGroup), &now())
            .await
            .unwrap();
        assert_eq!(outcome.card_list.list_stage_id, 2);
        assert_eq!(outcome.card_list.order, 0.0);

        let done = service.group_cards(LIST, DONE_GROUP, MANUAL_VIEW).await.unwrap();
        assert_eq!(ids(&done), vec![1, 4]);
        let todo = service.group_cards(LIST, TODO_GROUP, MANUAL_VIEW).await.unwrap();
        assert_eq!(ids(&todo), vec![2, 3]);
    }

    #[tokio::test]
    async fn test_drop_into_field_group_writes_normalized_value() {
        let (store, _, service) = seeded();
        let outcome = service
            .handle_drop(request(HIGH_GROUP, 2, 5, DropDestination::OtherGroup), &now())
            .await
            .unwrap();
        assert_eq!(outcome.card.map(|c| c.data.get("priority").cloned()), Some(Some(json!(["High"]))));
        assert_eq!(store.card(2).and_then(|c| c.order_in(LIST)), Some(1000.0));

        let high = service.group_cards(LIST, HIGH_GROUP, MANUAL_VIEW).await.unwrap();
        assert_eq!(ids(&high), vec![2]);
    }

    #[tokio::test]
    async fn test_sorted_view_rejects_without_mutation() {
        let (store, feedback, service) = seeded();
        let mut req = request(TODO_GROUP, 3, 0, DropDestination::SameGroup);
        req.view_id = SORTED_VIEW;

        let err = service.handle_drop(req, &now()).await.unwrap_err();
        assert!(matches!(err, CoreError::Drag(DragError::SortingActive)));
        assert_eq!(feedback.messages(), vec![(FeedbackLevel::Warning, SORTING_ACTIVE_MESSAGE.to_string())]);
        assert_eq!(store.card(3).and_then(|c| c.order_in(LIST)), Some(3000.0));
    }

    #[tokio::test]
    async fn test_same_group_drop_rejects_card_from_another_group() {
        let (store, feedback, service) = seeded();

        let err = service
            .handle_drop(request(TODO_GROUP, 4, 0, DropDestination::SameGroup), &now())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::ValidationError(_)));
        assert!(feedback.messages().is_empty());
        let card = store.card(4).unwrap();
        assert_eq!(card.order_in(LIST), Some(1000.0));
        assert_eq!(card.card_list_for(LIST).map(|cl| cl.list_stage_id), Some(2));
    }

    #[tokio::test]
    async fn test_renumber_keeps_hidden_children_in_place() {
        const CHILDLESS_VIEW: i64 = 102;
        let (store, _, service) = seeded();
        store.put_card(card(2, 1, 1000.0));
        let mut child = card(5, 1, 1000.0);
        child.parent_id = Some(1);
        store.put_card(child);
        let mut childless = view(CHILDLESS_VIEW, false);
        childless.options.hide_children = true;
        store.put_view(childless);

        let before = service.group_cards(LIST, TODO_GROUP, MANUAL_VIEW).await.unwrap();
        assert_eq!(ids(&before), vec![1, 2, 5, 3]);

        let mut req = request(TODO_GROUP, 3, 1, DropDestination::SameGroup);
        req.view_id = CHILDLESS_VIEW;
        let outcome = service.handle_drop(req, &now()).await.unwrap();
        assert_eq!(outcome.card_list.order, 2000.0);

        let shown = service.group_cards(LIST, TODO_GROUP, CHILDLESS_VIEW).await.unwrap();
        assert_eq!(ids(&shown), vec![1, 3, 2]);
        let all = service.group_cards(LIST, TODO_GROUP, MANUAL_VIEW).await.unwrap();
        assert_eq!(ids(&all), vec![1, 3, 2, 5]);
        assert_eq!(store.card(5).and_then(|c| c.order_in(LIST)), Some(4000.0));
    }

    #[tokio::test]
    async fn test_write_failure_reports_generic_message() {
        let (store, feedback, service) = seeded();
        store.fail_writes(true);

        let err = service
            .handle_drop(request(TODO_GROUP, 3, 0, DropDestination::SameGroup), &now())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Repository(_)));
        assert_eq!(feedback.messages(), vec![(FeedbackLevel::Error, GENERIC_FAILURE_MESSAGE.to_string())]);
    }

    #[tokio::test]
    async fn test_update_field_value_clears_empty_values() {
        let (store, _, service) = seeded();
        service.update_field_value(1, &priority(), &json!({ "item": "High" })).await.unwrap();
        assert_eq!(store.card(1).unwrap().data.get("priority"), Some(&json!(["High"])));

        service.update_field_value(1, &priority(), &json!([])).await.unwrap();
        assert!(store.card(1).unwrap().data.get("priority").is_none());
    }

    #[tokio::test]
    async fn test_membership_update_checks_owner_and_stage() {
        let (store, _, service) = seeded();
        let update = CardListUpdate { list_stage_id: Some(2), order: None };

        let wrong_card = service.update_card_membership(2, 10, &update).await.unwrap_err();
        assert!(matches!(wrong_card, CoreError::NotFound(_)));

        let bad_stage = CardListUpdate { list_stage_id: Some(99), order: None };
        let err = service.update_card_membership(1, 10, &bad_stage).await.unwrap_err();
        assert!(matches!(err, CoreError::ValidationError(_)));

        let updated = service.update_card_membership(1, 10, &update).await.unwrap();
        assert_eq!(updated.list_stage_id, 2);
        assert_eq!(store.card(1).and_then(|c| c.order_in(LIST)), Some(1000.0));
    }

    #[tokio::test]
    async fn test_prefill_and_toggle() {
        let (_, _, service) = seeded();
        let prefill = service.prefill(LIST, DONE_GROUP, &now()).await.unwrap();
        assert_eq!(prefill.list_stage.map(|s| s.id), Some(2));

        assert!(!service.toggle_group(LIST, TODO_GROUP).await.unwrap().is_expanded);
        assert!(service.toggle_group(LIST, TODO_GROUP).await.unwrap().is_expanded);

        let missing = service.toggle_group(2, TODO_GROUP).await.unwrap_err();
        assert!(matches!(missing, CoreError::NotFound(_)));
    }
}
