use serde::Serialize;

// Field names follow the collection protocol of the events endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "t")]
pub enum Hit {
    #[serde(rename = "PAGEVIEW")]
    PageView {
        #[serde(rename = "dl")]
        document_location: String,
    },
    #[serde(rename = "EVENT")]
    Event {
        #[serde(rename = "ec")]
        category: EventCategory,
        #[serde(rename = "ea")]
        action: String,
        #[serde(rename = "el", skip_serializing_if = "Option::is_none")]
        label: Option<String>,
        #[serde(rename = "ev", skip_serializing_if = "Option::is_none")]
        value: Option<u32>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EventCategory {
    #[serde(rename = "Action Tracking")]
    ActionTracking,
}

impl Hit {
    pub fn page_view(document_location: impl Into<String>) -> Self {
        Hit::PageView {
            document_location: document_location.into(),
        }
    }

    pub fn action(action: impl Into<String>, label: impl Into<String>, value: u32) -> Self {
        Hit::Event {
            category: EventCategory::ActionTracking,
            action: action.into(),
            label: Some(label.into()),
            value: Some(value),
        }
    }
}
