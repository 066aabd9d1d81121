//! The "Usage" column of the network plugins table.

use super::markup::{esc_url, sanitize_html_class, sanitize_key, Markup};
use crate::models::{active_on_label, TenantId, TenantRecord};

/// Column identifier.
pub const COLUMN: &str = "active_sites";

/// Column header label.
pub const COLUMN_LABEL: &str = "Usage";

/// Plugin list filters under which the column is shown.
pub const ALLOWED_PLUGIN_STATUS: &[&str] = &["all", "active", "inactive"];

/// Site lists with at least this many entries start collapsed.
pub const COLLAPSE_AT: usize = 4;

/// Add the usage column to `columns` unless an incompatible status filter
/// is active.
pub fn usage_column(columns: &mut Vec<(String, String)>, plugin_status: Option<&str>) {
    let show = match plugin_status {
        None => true,
        Some(status) => ALLOWED_PLUGIN_STATUS.contains(&sanitize_key(status).as_str()),
    };

    if show {
        columns.push((COLUMN.to_string(), COLUMN_LABEL.to_string()));
    }
}

/// Render the usage cell of `plugin_file` for `column_name`.
///
/// Returns an empty string for any other column.
pub fn render_usage_cell(
    column_name: &str,
    plugin_file: &str,
    network_active: bool,
    sites: &[(TenantId, TenantRecord)],
) -> String {
    if column_name != COLUMN {
        return String::new();
    }

    let mut m = Markup::new();

    if network_active {
        nowrap(&mut m, "Network Active");
        return m.into_string();
    }

    if sites.is_empty() {
        nowrap(&mut m, "Not Active");
        return m.into_string();
    }

    let list_id = format!("siteslist_{}", plugin_file);
    let display = if sites.len() >= COLLAPSE_AT {
        "display: none"
    } else {
        "display: block"
    };

    m.element(
        "p",
        &[
            ("data-toggle-id", list_id.as_str()),
            ("onclick", "toggleSiteList(this);"),
            ("style", "cursor: pointer"),
        ],
        |m| {
            m.element("span", &[("class", "dashicons dashicons-arrow-right")], |m| {
                m.nbsp();
            });
            m.text(&active_on_label(sites.len()));
        },
    );

    m.element(
        "ul",
        &[
            ("id", list_id.as_str()),
            ("class", "siteslist"),
            ("style", display),
        ],
        |m| {
            for (site_id, site) in sites {
                site_item(m, *site_id, site);
            }
        },
    );

    m.into_string()
}

fn nowrap(m: &mut Markup, label: &str) {
    m.element("span", &[("style", "white-space:nowrap")], |m| {
        m.text(label);
    });
}

fn site_item(m: &mut Markup, site_id: TenantId, site: &TenantRecord) {
    let mut class = "";
    let mut hint = String::new();
    if site.archived {
        class = "site-archived";
        hint.push_str(", Archived");
    }
    if site.deleted {
        class = "site-deleted";
        hint.push_str(", Deleted");
    }

    let class = sanitize_html_class(class);
    let title = format!("Blog ID: {}", site_id);
    let href = esc_url(&site.admin_url());

    m.element("li", &[("class", class.as_str()), ("title", title.as_str())], |m| {
        m.element("span", &[("class", "non-breaking")], |m| {
            m.element("a", &[("href", href.as_str())], |m| {
                m.text(&site.name).text(&hint);
            });
        });
    });
}
