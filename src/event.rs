use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::{Display, Formatter};

use crate::{
    commands::Command,
    properties::{HostTab, TabId},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageArea {
    /// Private to this peer.
    Local,
    /// Replicated between peers by the environment.
    Shared,
}

impl Display for StorageArea {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            StorageArea::Local => write!(f, "local"),
            StorageArea::Shared => write!(f, "shared"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageChange {
    pub key: String,
    #[serde(default)]
    pub old_value: Option<Value>,
    #[serde(default)]
    pub new_value: Option<Value>,
}

/// Everything the host environment reports to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum HostEvent {
    TabCreated(HostTab),
    /// A navigation started; the tab carries the url being loaded.
    TabLoading(HostTab),
    TabComplete(HostTab),
    TabRemoved {
        id: TabId,
        /// The tab went away with its window, not through the user closing it.
        window_closing: bool,
    },
    /// Network level redirect observed while a tab was loading.
    Redirect {
        id: TabId,
        source: String,
        target: String,
    },
    WindowCreated {
        normal: bool,
    },
    WindowRemoved,
    StorageChanged(StorageArea, Vec<StorageChange>),
    Command(Command),
}

impl Display for HostEvent {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            HostEvent::TabCreated(tab) => write!(f, "TabCreated({} {})", tab.id, tab.url),
            HostEvent::TabLoading(tab) => write!(f, "TabLoading({} {})", tab.id, tab.url),
            HostEvent::TabComplete(tab) => write!(f, "TabComplete({} {})", tab.id, tab.url),
            HostEvent::TabRemoved { id, window_closing } => {
                write!(f, "TabRemoved({id}, window_closing: {window_closing})")
            }
            HostEvent::Redirect { id, source, target } => {
                write!(f, "Redirect({id} {source} -> {target})")
            }
            HostEvent::WindowCreated { normal } => write!(f, "WindowCreated(normal: {normal})"),
            HostEvent::WindowRemoved => write!(f, "WindowRemoved"),
            HostEvent::StorageChanged(area, changes) => write!(
                f,
                "StorageChanged({area}: {})",
                changes
                    .iter()
                    .map(|c| c.key.clone())
                    .collect::<Vec<String>>()
                    .join(", ")
            ),
            HostEvent::Command(command) => write!(f, "Command({command})"),
        }
    }
}
