//! Output formatting: aligned tables and report rendering

use clap::ValueEnum;

use mqspec_provision::ProvisionReport;

use crate::Result;

/// How command results are written to stdout
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Aligned table
    #[default]
    Text,
    /// Pretty-printed JSON
    Json,
}

/// Render rows as a column-aligned table with headers.
pub fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    // Calculate column widths
    let num_cols = headers.len();
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if i < num_cols {
                widths[i] = widths[i].max(cell.len());
            }
        }
    }

    let mut out = String::new();
    let header_line: Vec<String> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| format!("{:<width$}", h, width = widths[i]))
        .collect();
    out.push_str(header_line.join("  ").trim_end());
    out.push('\n');

    for row in rows {
        let line: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(i, cell)| {
                let w = widths.get(i).copied().unwrap_or(0);
                format!("{:<width$}", cell, width = w)
            })
            .collect();
        out.push_str(line.join("  ").trim_end());
        out.push('\n');
    }
    out
}

/// Render a provisioning report in the requested format
pub fn render_report(report: &ProvisionReport, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => {
            let mut json = serde_json::to_string_pretty(report)?;
            json.push('\n');
            Ok(json)
        }
        OutputFormat::Text => Ok(render_report_text(report)),
    }
}

fn render_report_text(report: &ProvisionReport) -> String {
    let cluster = &report.cluster;
    let mut rows = vec![vec![
        "cluster".to_string(),
        cluster.name.clone(),
        cluster.arn.clone(),
        if report.created { "created" } else { "existing" }.to_string(),
    ]];

    if let Some(network) = &report.network {
        rows.push(vec![
            "vpc".to_string(),
            network.vpc_id.clone(),
            network.cidr.clone(),
            "created".to_string(),
        ]);
        rows.push(vec![
            "subnet".to_string(),
            network.subnet_id.clone(),
            network.cidr.clone(),
            "created".to_string(),
        ]);
        rows.push(vec![
            "internet-gateway".to_string(),
            network.internet_gateway_id.clone(),
            network.vpc_id.clone(),
            "attached".to_string(),
        ]);
        rows.push(vec![
            "route-table".to_string(),
            network.route_table_id.clone(),
            "0.0.0.0/0".to_string(),
            "routed".to_string(),
        ]);
        rows.push(vec![
            "security-group".to_string(),
            network.security_group_id.clone(),
            format!("{} ingress rules", network.ingress.len()),
            "created".to_string(),
        ]);
    }

    if let Some(access) = &report.access {
        rows.push(vec![
            "role".to_string(),
            access.role_name.clone(),
            access.role_arn.clone(),
            "created".to_string(),
        ]);
        rows.push(vec![
            "policy".to_string(),
            access.policy_name.clone(),
            access.policy_arn.clone(),
            if access.policy_attached { "attached" } else { "detached" }.to_string(),
        ]);
        rows.push(vec![
            "instance-profile".to_string(),
            access.instance_profile_name.clone(),
            String::new(),
            "created".to_string(),
        ]);
    }

    let mut out = render_table(&["RESOURCE", "ID", "DETAIL", "STATE"], &rows);
    out.push_str(&format!(
        "\nrecipe: {}\ncapacity: {}/{} nodes registered\n",
        report.recipe, report.capacity.registered_nodes, report.capacity.desired
    ));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use mqspec_provision::{Capacity, Cluster};

    fn existing_report() -> ProvisionReport {
        ProvisionReport {
            cluster: Cluster {
                arn: "arn:aws:ecs:us-west-1:1:cluster/demo".to_string(),
                name: "demo".to_string(),
                registered_nodes: 1,
                status: "ACTIVE".to_string(),
            },
            created: false,
            network: None,
            access: None,
            recipe: "recipe1".to_string(),
            capacity: Capacity {
                desired: 3,
                registered_nodes: 1,
            },
        }
    }

    #[test]
    fn table_columns_are_aligned() {
        let rows = vec![
            vec!["a".to_string(), "long-value".to_string()],
            vec!["bbbb".to_string(), "x".to_string()],
        ];
        let table = render_table(&["NAME", "VALUE"], &rows);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines[0], "NAME  VALUE");
        assert_eq!(lines[1], "a     long-value");
        assert_eq!(lines[2], "bbbb  x");
    }

    #[test]
    fn empty_table_prints_headers() {
        assert_eq!(render_table(&["NAME"], &[]), "NAME\n");
    }

    #[test]
    fn text_report_for_existing_cluster() {
        let text = render_report(&existing_report(), OutputFormat::Text).unwrap();
        assert!(text.contains("existing"));
        assert!(text.contains("capacity: 1/3 nodes registered"));
        assert!(!text.contains("vpc"));
    }

    #[test]
    fn json_report_is_parseable() {
        let json = render_report(&existing_report(), OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["cluster"]["name"], "demo");
        assert_eq!(value["created"], false);
    }
}
