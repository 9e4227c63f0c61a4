use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;
use std::str::FromStr;

/// Axosoft time unit id for hours.
pub const HOURS_TIME_UNIT_ID: i64 = 2;

/// Named collections exposed under `https://{domain}/api/v1/`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Me,
    Projects,
    Features,
    Defects,
    Incidents,
    Tasks,
    WorkLogs,
}

impl Resource {
    pub fn path(self) -> &'static str {
        match self {
            Resource::Me => "me",
            Resource::Projects => "projects",
            Resource::Features => "features",
            Resource::Defects => "defects",
            Resource::Incidents => "incidents",
            Resource::Tasks => "tasks",
            Resource::WorkLogs => "work_logs",
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

impl FromStr for Resource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "me" => Ok(Resource::Me),
            "projects" => Ok(Resource::Projects),
            "work_logs" => Ok(Resource::WorkLogs),
            other => other.parse::<ItemType>().map(Resource::from),
        }
    }
}

/// The four work-item collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemType {
    Features,
    Defects,
    Incidents,
    Tasks,
}

impl ItemType {
    pub const ALL: [ItemType; 4] = [
        ItemType::Tasks,
        ItemType::Defects,
        ItemType::Incidents,
        ItemType::Features,
    ];

    pub fn as_str(self) -> &'static str {
        Resource::from(self).path()
    }

    /// Menu label used by Axosoft's UI.
    pub fn label(self) -> &'static str {
        match self {
            ItemType::Tasks => "Custom Items",
            ItemType::Defects => "Defects",
            ItemType::Incidents => "Incidents",
            ItemType::Features => "User Stories",
        }
    }

    pub fn prefix(self) -> char {
        match self {
            ItemType::Features => 'f',
            ItemType::Defects => 'd',
            ItemType::Incidents => 'i',
            ItemType::Tasks => 't',
        }
    }

    pub fn from_prefix(prefix: char) -> Option<Self> {
        ItemType::ALL.into_iter().find(|t| t.prefix() == prefix)
    }

    pub fn from_label(label: &str) -> Option<Self> {
        ItemType::ALL.into_iter().find(|t| t.label() == label)
    }
}

impl From<ItemType> for Resource {
    fn from(item_type: ItemType) -> Self {
        match item_type {
            ItemType::Features => Resource::Features,
            ItemType::Defects => Resource::Defects,
            ItemType::Incidents => Resource::Incidents,
            ItemType::Tasks => Resource::Tasks,
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // the API reports singular item_type values ("feature") on items
        match s.trim().to_ascii_lowercase().as_str() {
            "features" | "feature" => Ok(ItemType::Features),
            "defects" | "defect" => Ok(ItemType::Defects),
            "incidents" | "incident" => Ok(ItemType::Incidents),
            "tasks" | "task" => Ok(ItemType::Tasks),
            other => Err(format!("unknown item type `{other}`")),
        }
    }
}

/// List filters. `assigned_to_id` and `search_string` map straight to query params.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemQuery {
    pub assigned_to_id: Option<i64>,
    pub search_string: Option<String>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

impl ItemQuery {
    pub fn assigned_to(user_id: i64) -> Self {
        Self {
            assigned_to_id: Some(user_id),
            ..Self::default()
        }
    }

    pub fn search(text: impl Into<String>) -> Self {
        Self {
            search_string: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn to_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        if let Some(id) = self.assigned_to_id {
            pairs.push(("assigned_to_id".to_string(), id.to_string()));
        }
        if let Some(search) = &self.search_string {
            pairs.push(("search_string".to_string(), search.clone()));
        }
        if let Some(page) = self.page {
            pairs.push(("page".to_string(), page.to_string()));
        }
        if let Some(size) = self.page_size {
            pairs.push(("page_size".to_string(), size.to_string()));
        }
        pairs
    }
}

/// A work item as returned by the API. Only `id`, `item_type` and `name` are
/// guaranteed; everything else is kept verbatim in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceItem {
    pub id: i64,
    pub item_type: String,
    #[serde(default)]
    pub name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ResourceItem {
    pub fn kind(&self) -> Option<ItemType> {
        self.item_type.parse().ok()
    }

    /// Title for list entries and item views, e.g. `axof: #12 - Login page`.
    pub fn label(&self) -> String {
        let prefix = self
            .kind()
            .map(ItemType::prefix)
            .or_else(|| self.item_type.chars().next())
            .unwrap_or('?');
        format!("axo{}: #{} - {}", prefix, self.id, self.name)
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Parse the `axo[dfit]: #<id>` prefix of an item view title.
pub fn item_view_id(title: &str) -> Option<(ItemType, i64)> {
    let rest = title.strip_prefix("axo")?;
    let mut chars = rest.chars();
    let item_type = ItemType::from_prefix(chars.next()?)?;
    let rest = chars.as_str().strip_prefix(':')?.trim_start().strip_prefix('#')?;
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    let id = digits.parse().ok()?;
    Some((item_type, id))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentUser {
    pub id: i64,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

impl CurrentUser {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: i64,
    pub name: String,
}

/// Time logged against an item. Duration stays a string: the server decides
/// whether it is a number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkLogEntry {
    pub user_id: i64,
    pub item_id: i64,
    pub item_type: String,
    pub duration: String,
    pub description: String,
    /// ISO-8601
    pub timestamp: String,
}

impl WorkLogEntry {
    pub fn to_payload(&self) -> Value {
        json!({
            "user": { "id": self.user_id },
            "work_done": {
                "duration": self.duration,
                "time_unit": { "id": HOURS_TIME_UNIT_ID }
            },
            "item": {
                "id": self.item_id,
                "item_type": self.item_type
            },
            "description": self.description,
            "date_time": self.timestamp
        })
    }
}

/// Fields collected by the create-item wizard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewItem {
    pub name: String,
    pub description: String,
    pub estimate_hours: String,
}

impl NewItem {
    pub fn to_payload(&self, project_id: &Value) -> Value {
        json!({
            "item": {
                "name": self.name,
                "description": self.description,
                "project": { "id": project_id },
                "estimated_duration": {
                    "duration": self.estimate_hours,
                    "time_unit": { "id": HOURS_TIME_UNIT_ID }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_type_parses_plural_and_singular() {
        assert_eq!("features".parse::<ItemType>(), Ok(ItemType::Features));
        assert_eq!("Defect".parse::<ItemType>(), Ok(ItemType::Defects));
        assert!("bugs".parse::<ItemType>().is_err());
        assert_eq!("work_logs".parse::<Resource>(), Ok(Resource::WorkLogs));
        assert_eq!("tasks".parse::<Resource>(), Ok(Resource::Tasks));
        assert_eq!(ItemType::from_label("User Stories"), Some(ItemType::Features));
        assert_eq!(ItemType::Tasks.label(), "Custom Items");
    }

    #[test]
    fn item_label_round_trips_through_view_title() {
        let item: ResourceItem = serde_json::from_value(json!({
            "id": 314,
            "item_type": "defects",
            "name": "Crash on save",
            "priority": {"id": 1}
        }))
        .unwrap();

        let label = item.label();
        assert_eq!(label, "axod: #314 - Crash on save");
        assert_eq!(item_view_id(&label), Some((ItemType::Defects, 314)));
        assert_eq!(item.extra.get("priority"), Some(&json!({"id": 1})));
    }

    #[test]
    fn view_title_must_match_item_pattern() {
        assert_eq!(item_view_id("axox: #1 - nope"), None);
        assert_eq!(item_view_id("notes.txt"), None);
        assert_eq!(item_view_id("axof: 12"), None);
    }

    #[test]
    fn query_pairs_skip_unset_filters() {
        assert!(ItemQuery::default().to_pairs().is_empty());
        assert_eq!(
            ItemQuery::assigned_to(42).to_pairs(),
            vec![("assigned_to_id".to_string(), "42".to_string())]
        );
    }

    #[test]
    fn query_pairs_include_paging() {
        let query = ItemQuery {
            page: Some(2),
            page_size: Some(50),
            ..ItemQuery::search("login")
        };
        assert_eq!(
            query.to_pairs(),
            vec![
                ("search_string".to_string(), "login".to_string()),
                ("page".to_string(), "2".to_string()),
                ("page_size".to_string(), "50".to_string()),
            ]
        );
    }

    #[test]
    fn work_log_payload_uses_hours() {
        let entry = WorkLogEntry {
            user_id: 42,
            item_id: 7,
            item_type: "features".to_string(),
            duration: "1.5".to_string(),
            description: "pairing".to_string(),
            timestamp: "2024-03-01T10:00:00".to_string(),
        };
        let payload = entry.to_payload();
        assert_eq!(payload["work_done"]["duration"], "1.5");
        assert_eq!(payload["work_done"]["time_unit"]["id"], HOURS_TIME_UNIT_ID);
        assert_eq!(payload["item"]["item_type"], "features");
        assert_eq!(payload["user"]["id"], 42);
    }

    #[test]
    fn new_item_payload_nests_under_item() {
        let item = NewItem {
            name: "Export CSV".to_string(),
            description: "from the report screen".to_string(),
            estimate_hours: "3".to_string(),
        };
        let payload = item.to_payload(&json!(11));
        assert_eq!(payload["item"]["project"]["id"], 11);
        assert_eq!(payload["item"]["estimated_duration"]["duration"], "3");
    }
}
