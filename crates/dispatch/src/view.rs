use shared::domain::{CatalogItem, ItemId, ItemStatus};

/// What the embedding page should render for one item's publish control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlState {
    /// Enabled; clicking dispatches a publish (or a retry of a failure).
    Actionable,
    /// Disabled while a publish is underway somewhere.
    InProgress,
    /// Disabled for good; the thread went out.
    Done,
    /// Shows the short failure reason; clicking retries.
    Failed(String),
}

impl ControlState {
    pub fn label(&self) -> String {
        match self {
            ControlState::Actionable => "publish".to_string(),
            ControlState::InProgress => "in progress".to_string(),
            ControlState::Done => "done".to_string(),
            ControlState::Failed(reason) => format!("error: {reason}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemView {
    pub id: ItemId,
    pub status: ItemStatus,
    pub control: ControlState,
}

impl ItemView {
    pub(crate) fn from_item(item: &CatalogItem) -> Self {
        let control = match item.status {
            ItemStatus::Pending => ControlState::Actionable,
            ItemStatus::Publishing => ControlState::InProgress,
            ItemStatus::Published => ControlState::Done,
            ItemStatus::Failed => ControlState::Failed(
                item.last_error
                    .clone()
                    .unwrap_or_else(|| "unknown failure".to_string()),
            ),
        };
        Self {
            id: item.id.clone(),
            status: item.status,
            control,
        }
    }
}
