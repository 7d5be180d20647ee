use lookout_core::GridPosition;
use lookout_flags::FlagsSnapshot;
use lookout_registry::{ExtensionRegistry, OVERVIEW_TAB};
use serde::Serialize;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PlacedCard {
    pub component: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span: Option<u8>,
}

/// One dashboard tab with its cards assigned to grid slots.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DashboardTab {
    pub id: String,
    pub title: String,
    pub main: Vec<PlacedCard>,
    pub left: Vec<PlacedCard>,
    pub right: Vec<PlacedCard>,
}

impl DashboardTab {
    fn empty(id: &str, title: &str) -> Self {
        Self { id: id.to_string(), title: title.to_string(), main: Vec::new(), left: Vec::new(), right: Vec::new() }
    }

    pub fn slot(&self, position: GridPosition) -> &[PlacedCard] {
        match position {
            GridPosition::Main => &self.main,
            GridPosition::Left => &self.left,
            GridPosition::Right => &self.right,
        }
    }

    pub fn card_count(&self) -> usize { self.main.len() + self.left.len() + self.right.len() }
}

/// The built-in overview tab followed by visible plugin tabs. Cards keep
/// registration order within their slot; cards of hidden tabs are dropped.
pub fn dashboard_tabs(registry: &ExtensionRegistry, flags: &FlagsSnapshot) -> Vec<DashboardTab> {
    let view = registry.visible(flags);
    let mut tabs = vec![DashboardTab::empty(OVERVIEW_TAB, "Overview")];
    tabs.extend(view.dashboards_tabs().into_iter().map(|t| DashboardTab::empty(&t.id, &t.title)));
    for card in view.dashboards_cards() {
        let Some(tab) = tabs.iter_mut().find(|t| t.id == card.tab) else { continue; };
        let placed = PlacedCard { component: card.component.clone(), span: card.span };
        match card.position {
            GridPosition::Main => tab.main.push(placed),
            GridPosition::Left => tab.left.push(placed),
            GridPosition::Right => tab.right.push(placed),
        }
    }
    tabs
}
