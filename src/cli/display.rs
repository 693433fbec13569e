//! Display formatting for CLI output
//!
//! SBIO pattern: Pure functions that format data for display

use super::commands::ContextInfo;
use crate::resource::Resource;

// ============================================================================
// Table formatting helpers
// ============================================================================

/// Format a simple table with headers and rows
pub fn format_table(headers: &[&str], rows: Vec<Vec<String>>) -> String {
    if rows.is_empty() {
        return "No resources found.\n".to_string();
    }

    // Calculate column widths
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(cell.len());
            }
        }
    }

    let mut output = String::new();

    // Header
    for (i, header) in headers.iter().enumerate() {
        if i > 0 {
            output.push_str("   ");
        }
        output.push_str(&format!(
            "{:width$}",
            header.to_uppercase(),
            width = widths[i]
        ));
    }
    output.push('\n');

    // Rows
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if i > 0 {
                output.push_str("   ");
            }
            if i < widths.len() {
                output.push_str(&format!("{:width$}", cell, width = widths[i]));
            } else {
                output.push_str(cell);
            }
        }
        output.push('\n');
    }

    output
}

fn cell(resource: &Resource, attr: &str) -> String {
    resource.attr_str(attr).unwrap_or("-").to_string()
}

// ============================================================================
// Context display
// ============================================================================

/// Format context list for display
pub fn format_context_list(contexts: &[ContextInfo]) -> String {
    let headers = &["", "NAME", "URL"];
    let rows: Vec<Vec<String>> = contexts
        .iter()
        .map(|ctx| {
            vec![
                if ctx.is_current { "*" } else { " " }.to_string(),
                ctx.name.clone(),
                ctx.url.clone(),
            ]
        })
        .collect();

    format_table(headers, rows)
}

/// Format current context for display
pub fn format_current_context(name: &str, url: &str) -> String {
    format!("Current context: {} ({})\n", name, url)
}

// ============================================================================
// Resource display
// ============================================================================

pub fn format_cluster_list(clusters: &[&Resource]) -> String {
    let headers = &["ID", "NAME", "STATE"];
    let rows = clusters
        .iter()
        .map(|c| {
            vec![
                c.id().to_string(),
                c.display_name().to_string(),
                c.state().unwrap_or("-").to_string(),
            ]
        })
        .collect();

    format_table(headers, rows)
}

pub fn format_stack_list(stacks: &[&Resource]) -> String {
    let headers = &["ID", "NAME", "STATE", "ENV", "SERVICES"];
    let rows = stacks
        .iter()
        .map(|s| {
            let services = s
                .attr("serviceIds")
                .and_then(|ids| ids.as_array())
                .map(|ids| ids.len())
                .unwrap_or(0);
            vec![
                s.id().to_string(),
                s.display_name().to_string(),
                s.state().unwrap_or("-").to_string(),
                cell(s, "accountId"),
                services.to_string(),
            ]
        })
        .collect();

    format_table(headers, rows)
}

/// Services with their stack, environment and cluster ids
pub fn format_service_list(services: &[&Resource]) -> String {
    let headers = &["ID", "NAME", "STATE", "STACK", "ENV", "CLUSTER", "TYPE"];
    let rows = services
        .iter()
        .map(|s| {
            vec![
                s.id().to_string(),
                s.display_name().to_string(),
                s.state().unwrap_or("-").to_string(),
                cell(s, "stackId"),
                cell(s, "accountId"),
                cell(s, "clusterId"),
                s.kind().to_string(),
            ]
        })
        .collect();

    format_table(headers, rows)
}

/// Full snapshots as pretty JSON: one object, or an array for several
pub fn format_detail(resources: &[&Resource]) -> Result<String, serde_json::Error> {
    let mut output = match resources {
        [single] => serde_json::to_string_pretty(&single.to_value())?,
        many => serde_json::to_string_pretty(
            &many.iter().map(|r| r.to_value()).collect::<Vec<_>>(),
        )?,
    };
    output.push('\n');
    Ok(output)
}
