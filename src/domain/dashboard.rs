//! Dashboards and the widgets placed on them

use serde::{Deserialize, Serialize};

use crate::id::now_ms;
use crate::storage::HasId;

/// One placement of an instance on a dashboard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Widget {
    pub id: u32,
    pub instance_id: String,
    pub title: String,
}

/// A dashboard: a titled set of widgets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dashboard {
    pub id: String,
    pub title: String,
    pub owner: String,
    #[serde(default)]
    pub widgets: Vec<Widget>,
    pub created_at: u64,
    pub updated_at: u64,
}

impl Dashboard {
    pub fn new(id: impl Into<String>, title: impl Into<String>, owner: impl Into<String>) -> Self {
        let now = now_ms();
        Self {
            id: id.into(),
            title: title.into(),
            owner: owner.into(),
            widgets: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether any widget shows the given instance
    pub fn uses(&self, instance_id: &str) -> bool {
        self.widgets.iter().any(|w| w.instance_id == instance_id)
    }

    /// Place an instance and return the new widget id.
    pub fn add_widget(&mut self, instance_id: impl Into<String>, title: impl Into<String>) -> u32 {
        let id = self.widgets.iter().map(|w| w.id).max().map_or(1, |max| max + 1);
        self.widgets.push(Widget {
            id,
            instance_id: instance_id.into(),
            title: title.into(),
        });
        self.touch();
        id
    }

    pub fn remove_widget(&mut self, widget_id: u32) -> Option<Widget> {
        let idx = self.widgets.iter().position(|w| w.id == widget_id)?;
        self.touch();
        Some(self.widgets.remove(idx))
    }

    /// Remove every widget showing the instance; returns how many were removed.
    pub fn remove_widgets_of(&mut self, instance_id: &str) -> usize {
        let before = self.widgets.len();
        self.widgets.retain(|w| w.instance_id != instance_id);
        let removed = before - self.widgets.len();
        if removed > 0 {
            self.touch();
        }
        removed
    }

    pub fn touch(&mut self) {
        self.updated_at = now_ms();
    }
}

impl HasId for Dashboard {
    fn id(&self) -> &str {
        &self.id
    }
}
