//! Drag gesture state machine.
//!
//! ```text
//!   Idle --start--> Dragging --drop_within--> Idle
//!                      |     --drop_into----> Idle
//!                      |     --cancel-------> Idle
//!                      +-----move (sorted)--> Idle (aborted)
//! ```
//!
//! The ordering mode of the view is part of the machine. While a sort option
//! is active the machine is in [`OrderingMode::Sorted`] and `start` can never
//! reach `Dragging`, so no drop can be produced.

use serde::{Deserialize, Serialize};

use crate::lists::View;

pub const SORTING_ACTIVE_MESSAGE: &str = "Dragging cards is only enabled when sorting is disabled.";

/// Whether cards in a view follow their manual order or a sort option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderingMode {
    Manual,
    Sorted,
}

impl OrderingMode {
    pub fn for_view(view: &View) -> Self {
        if view.sort_by().is_empty() {
            OrderingMode::Manual
        } else {
            OrderingMode::Sorted
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragState {
    Idle,
    Dragging { card_id: i64 },
}

impl DragState {
    fn name(&self) -> &'static str {
        match self {
            DragState::Idle => "idle",
            DragState::Dragging { .. } => "dragging",
        }
    }
}

/// Where a dragged card was released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropDestination {
    /// Reordered inside the group it started in.
    SameGroup,
    /// Added to a different group.
    OtherGroup,
}

/// A completed gesture, ready to be planned against the target group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CardDrop {
    pub card_id: i64,
    pub new_index: usize,
    pub destination: DropDestination,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DragError {
    #[error("{}", SORTING_ACTIVE_MESSAGE)]
    SortingActive,
    #[error("Cannot {event} while {state}")]
    InvalidTransition { state: &'static str, event: &'static str },
    #[error("Drop index {index} is outside a group of {len} cards")]
    IndexOutOfRange { index: usize, len: usize },
}

#[derive(Debug, Clone)]
pub struct DragMachine {
    state: DragState,
    mode: OrderingMode,
}

impl DragMachine {
    pub fn new(view: &View) -> Self {
        Self::with_mode(OrderingMode::for_view(view))
    }

    pub fn with_mode(mode: OrderingMode) -> Self {
        Self {
            state: DragState::Idle,
            mode,
        }
    }

    pub fn state(&self) -> DragState {
        self.state
    }

    pub fn mode(&self) -> OrderingMode {
        self.mode
    }

    /// Picks up the view's current sort configuration.
    pub fn sync_view(&mut self, view: &View) {
        self.mode = OrderingMode::for_view(view);
    }

    pub fn start(&mut self, card_id: i64) -> Result<(), DragError> {
        if let DragState::Dragging { .. } = self.state {
            return Err(self.invalid("start"));
        }
        if self.mode == OrderingMode::Sorted {
            return Err(DragError::SortingActive);
        }
        self.state = DragState::Dragging { card_id };
        Ok(())
    }

    /// Called on every move tick. Aborts the gesture if sorting became active.
    pub fn on_move(&mut self) -> Result<(), DragError> {
        self.dragged_card("move")?;
        if self.mode == OrderingMode::Sorted {
            self.state = DragState::Idle;
            return Err(DragError::SortingActive);
        }
        Ok(())
    }

    pub fn drop_within(&mut self, new_index: usize) -> Result<CardDrop, DragError> {
        self.finish("drop", new_index, DropDestination::SameGroup)
    }

    pub fn drop_into(&mut self, new_index: usize) -> Result<CardDrop, DragError> {
        self.finish("add", new_index, DropDestination::OtherGroup)
    }

    pub fn cancel(&mut self) -> Result<(), DragError> {
        self.dragged_card("cancel")?;
        self.state = DragState::Idle;
        Ok(())
    }

    fn finish(
        &mut self,
        event: &'static str,
        new_index: usize,
        destination: DropDestination,
    ) -> Result<CardDrop, DragError> {
        let card_id = self.dragged_card(event)?;
        self.state = DragState::Idle;
        Ok(CardDrop {
            card_id,
            new_index,
            destination,
        })
    }

    fn dragged_card(&self, event: &'static str) -> Result<i64, DragError> {
        match self.state {
            DragState::Dragging { card_id } => Ok(card_id),
            DragState::Idle => Err(self.invalid(event)),
        }
    }

    fn invalid(&self, event: &'static str) -> DragError {
        DragError::InvalidTransition {
            state: self.state.name(),
            event,
        }
    }
}
