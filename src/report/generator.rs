//! Usage report generation.
//!
//! Turns a snapshot into per-plugin usage and renders it as Markdown,
//! JSON or an HTML table using the usage column renderer.

use super::column::{render_usage_cell, usage_column, COLUMN};
use super::markup::esc_html;
use crate::models::{AggregateSnapshot, PluginUsage, TenantRecord};
use crate::network::NetworkActivation;
use anyhow::Result;

/// Compute usage for every plugin seen in the snapshot plus any extra
/// plugin files requested by the caller.
pub fn usage_report(
    snapshot: &AggregateSnapshot,
    activation: &dyn NetworkActivation,
    extra: &[String],
) -> Vec<PluginUsage> {
    let mut plugins = snapshot.known_plugins();
    for plugin in extra {
        if !plugins.contains(plugin) {
            plugins.push(plugin.clone());
        }
    }

    plugins
        .into_iter()
        .map(|plugin_file| plugin_usage(snapshot, activation, plugin_file))
        .collect()
}

/// Usage of a single plugin.
pub fn plugin_usage(
    snapshot: &AggregateSnapshot,
    activation: &dyn NetworkActivation,
    plugin_file: String,
) -> PluginUsage {
    let network_active = activation.is_network_active(&plugin_file);
    let sites = if network_active {
        Vec::new()
    } else {
        snapshot
            .tenants_running(&plugin_file)
            .into_iter()
            .map(|(_, record)| record)
            .collect()
    };

    PluginUsage {
        plugin_file,
        network_active,
        sites,
    }
}

/// Generate a Markdown usage table.
pub fn generate_markdown_report(snapshot: &AggregateSnapshot, usage: &[PluginUsage]) -> String {
    let mut output = String::new();

    output.push_str("# Plugin Usage\n\n");
    output.push_str(&format!(
        "- **Sites scanned:** {}\n- **Snapshot taken:** {}\n\n",
        snapshot.len(),
        snapshot.built_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));

    if usage.is_empty() {
        output.push_str("No active plugins were found on any site.\n");
        return output;
    }

    output.push_str("| Plugin | Usage | Sites |\n");
    output.push_str("|:---|:---|:---|\n");

    for entry in usage {
        let sites: Vec<String> = entry.sites.iter().map(site_label).collect();
        output.push_str(&format!(
            "| `{}` | {} | {} |\n",
            entry.plugin_file,
            entry.label(),
            sites.join(", ").replace('|', "\\|")
        ));
    }
    output.push('\n');

    output
}

/// Generate a JSON usage report.
pub fn generate_json_report(usage: &[PluginUsage]) -> Result<String> {
    serde_json::to_string_pretty(usage).map_err(Into::into)
}

/// Generate an HTML plugins table with the usage column.
pub fn generate_html_report(usage: &[PluginUsage], plugin_status: Option<&str>) -> String {
    let mut columns = vec![("name".to_string(), "Plugin".to_string())];
    usage_column(&mut columns, plugin_status);

    let mut html = String::new();
    html.push_str("<table class=\"wp-list-table widefat plugins\">\n<thead><tr>");
    for (id, label) in &columns {
        html.push_str(&format!(
            "<th scope=\"col\" id=\"{}\">{}</th>",
            esc_html(id),
            esc_html(label)
        ));
    }
    html.push_str("</tr></thead>\n<tbody>\n");

    for entry in usage {
        html.push_str("<tr>");
        for (id, _) in &columns {
            if id == COLUMN {
                let sites: Vec<_> = entry.sites.iter().map(|s| (s.id, s.clone())).collect();
                html.push_str(&format!(
                    "<td class=\"{}\">{}</td>",
                    COLUMN,
                    render_usage_cell(id, &entry.plugin_file, entry.network_active, &sites)
                ));
            } else {
                html.push_str(&format!(
                    "<td class=\"plugin-title\">{}</td>",
                    esc_html(&entry.plugin_file)
                ));
            }
        }
        html.push_str("</tr>\n");
    }

    html.push_str("</tbody>\n</table>\n");
    html
}

fn site_label(site: &TenantRecord) -> String {
    site.to_string()
}
