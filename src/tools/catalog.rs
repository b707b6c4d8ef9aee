//! Sample enterprise tools backed by canned data.
//!
//! The handlers are deterministic stand-ins for a knowledge base, a CRM and a
//! ticketing system, except that ticket ids and timestamps come from the
//! clock.

use chrono::Utc;
use serde_json::{Value, json};

use crate::error::{BoxError, ToolError};
use crate::tools::{ParamType, ToolArgs, ToolParameter, ToolRegistry};

pub const TICKET_BASE_URL: &str = "https://support.example.com/tickets";

/// A registry holding every sample tool.
pub fn sample_registry() -> Result<ToolRegistry, ToolError> {
    let mut registry = ToolRegistry::new();
    register_sample_tools(&mut registry)?;
    Ok(registry)
}

pub fn register_sample_tools(registry: &mut ToolRegistry) -> Result<(), ToolError> {
    registry.register(
        "query_knowledge_base",
        "Query the company's internal knowledge base for policies, procedures, products \
         or services. Returns matching documents with their metadata.",
        vec![
            ToolParameter::required("query", ParamType::String, "The search query (natural language)"),
            ToolParameter::optional(
                "max_results",
                ParamType::Integer,
                "Maximum number of results to return",
            )
            .with_default(5),
        ],
        query_knowledge_base,
    )?;

    registry.register(
        "lookup_customer",
        "Look up a customer record in the CRM. Only non-sensitive fields are returned.",
        vec![
            ToolParameter::required(
                "customer_id",
                ParamType::String,
                "Unique customer identifier (email or ID)",
            ),
            ToolParameter::optional(
                "include_history",
                ParamType::Boolean,
                "Whether to include interaction history",
            )
            .with_default(false),
        ],
        lookup_customer,
    )?;

    registry.register(
        "create_support_ticket",
        "Open a support ticket for a customer issue.",
        vec![
            ToolParameter::required("title", ParamType::String, "Brief summary of the issue"),
            ToolParameter::required(
                "description",
                ParamType::String,
                "Detailed description of the issue",
            ),
            ToolParameter::optional("priority", ParamType::String, "Ticket priority level")
                .with_enum(["low", "medium", "high", "critical"])
                .with_default("medium"),
            ToolParameter::optional("customer_id", ParamType::String, "Associated customer ID"),
        ],
        create_support_ticket,
    )?;

    registry.register(
        "calculate_cost",
        "Estimate the monthly cost of a cloud resource from its type, tier and usage.",
        vec![
            ToolParameter::required("resource_type", ParamType::String, "Type of cloud resource")
                .with_enum(["vm", "storage", "sql", "app_service", "ai_service"]),
            ToolParameter::required("tier", ParamType::String, "Service tier or SKU"),
            ToolParameter::optional(
                "hours_per_month",
                ParamType::Integer,
                "Expected usage hours per month",
            )
            .with_default(730),
        ],
        calculate_cost,
    )?;

    Ok(())
}

async fn query_knowledge_base(args: ToolArgs) -> Result<Value, BoxError> {
    let query = args.str("query")?;
    let max_results = args.i64("max_results")?;
    if max_results < 1 {
        return Err("max_results must be at least 1".into());
    }

    let results = [json!({
        "title": "Company Policy: Remote Work",
        "content": "Remote work is permitted for all employees with manager approval.",
        "relevance_score": 0.95,
        "source": "policies/remote-work.pdf",
    })];
    let results = results
        .into_iter()
        .take(max_results as usize)
        .collect::<Vec<_>>();

    Ok(json!({
        "query": query,
        "total_results": results.len(),
        "results": results,
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

async fn lookup_customer(args: ToolArgs) -> Result<Value, BoxError> {
    let customer_id = args.str("customer_id")?;
    let history = if args.bool("include_history")? {
        json!([{"date": "2024-01-15", "type": "Support Ticket", "status": "Resolved"}])
    } else {
        json!([])
    };

    Ok(json!({
        "customer_id": customer_id,
        "name": "Acme Corporation",
        "status": "Active",
        "tier": "Enterprise",
        "account_manager": "Jane Smith",
        "history": history,
    }))
}

async fn create_support_ticket(args: ToolArgs) -> Result<Value, BoxError> {
    let title = args.str("title")?;
    let description = args.str("description")?;
    let priority = args.str("priority")?;
    let customer_id = args.opt_str("customer_id")?;

    let now = Utc::now();
    let ticket_id = format!("TICK-{}", now.format("%Y%m%d%H%M%S"));

    Ok(json!({
        "ticket_id": ticket_id,
        "status": "created",
        "priority": priority,
        "title": title,
        "description": description,
        "customer_id": customer_id,
        "created_at": now.to_rfc3339(),
        "url": format!("{TICKET_BASE_URL}/{ticket_id}"),
    }))
}

async fn calculate_cost(args: ToolArgs) -> Result<Value, BoxError> {
    let resource_type = args.str("resource_type")?;
    let tier = args.str("tier")?;
    let hours = args.i64("hours_per_month")?;
    if hours < 0 {
        return Err("hours_per_month must not be negative".into());
    }

    let rate = hourly_rate(resource_type, tier);
    let monthly = (rate * hours as f64 * 100.0).round() / 100.0;

    Ok(json!({
        "resource_type": resource_type,
        "tier": tier,
        "hourly_rate": rate,
        "monthly_hours": hours,
        "estimated_monthly_cost": monthly,
        "currency": "USD",
    }))
}

/// Hourly USD rate; unknown combinations fall back to a flat 0.10.
pub fn hourly_rate(resource_type: &str, tier: &str) -> f64 {
    match (resource_type, tier) {
        ("vm", "basic") => 0.05,
        ("vm", "standard") => 0.15,
        ("vm", "premium") => 0.50,
        ("storage", "basic") => 0.01,
        ("storage", "standard") => 0.02,
        ("storage", "premium") => 0.05,
        _ => 0.10,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> ToolRegistry {
        sample_registry().expect("sample tools register")
    }

    #[test]
    fn catalog_registers_four_tools_in_order() {
        let names = registry()
            .all_schemas()
            .into_iter()
            .map(|definition| definition.function.name)
            .collect::<Vec<_>>();
        assert_eq!(
            names,
            vec![
                "query_knowledge_base",
                "lookup_customer",
                "create_support_ticket",
                "calculate_cost"
            ]
        );
    }

    #[tokio::test]
    async fn cost_is_a_pure_function_of_inputs() {
        let registry = registry();
        let arguments = json!({"resource_type": "vm", "tier": "standard", "hours_per_month": 730});

        let first = registry
            .execute("calculate_cost", arguments.clone())
            .await
            .expect("runs");
        let second = registry
            .execute("calculate_cost", arguments)
            .await
            .expect("runs");

        assert_eq!(first, second);
        assert_eq!(first["estimated_monthly_cost"], json!(109.5));
        assert_eq!(first["hourly_rate"], json!(0.15));
        assert_eq!(first["currency"], json!("USD"));
    }

    #[tokio::test]
    async fn cost_defaults_hours_and_falls_back_on_unknown_tier() {
        let value = registry()
            .execute("calculate_cost", json!({"resource_type": "sql", "tier": "gold"}))
            .await
            .expect("runs");
        assert_eq!(value["monthly_hours"], json!(730));
        assert_eq!(value["estimated_monthly_cost"], json!(73.0));
    }

    #[tokio::test]
    async fn cost_rejects_unknown_resource_type() {
        let err = registry()
            .execute("calculate_cost", json!({"resource_type": "gpu", "tier": "basic"}))
            .await
            .expect_err("enum enforced");
        assert!(matches!(err, ToolError::InvalidArguments { .. }));
    }

    #[tokio::test]
    async fn ticket_defaults_priority_and_links_url() {
        let value = registry()
            .execute(
                "create_support_ticket",
                json!({"title": "Login broken", "description": "SSO loop"}),
            )
            .await
            .expect("runs");

        let ticket_id = value["ticket_id"].as_str().expect("ticket id");
        assert!(ticket_id.starts_with("TICK-"));
        assert_eq!(ticket_id.len(), "TICK-".len() + 14);
        assert_eq!(value["priority"], json!("medium"));
        assert_eq!(value["status"], json!("created"));
        assert_eq!(value["url"], json!(format!("{TICKET_BASE_URL}/{ticket_id}")));
    }

    #[tokio::test]
    async fn customer_history_only_when_requested() {
        let registry = registry();

        let without = registry
            .execute("lookup_customer", json!({"customer_id": "c-42"}))
            .await
            .expect("runs");
        assert_eq!(without["history"], json!([]));

        let with = registry
            .execute(
                "lookup_customer",
                json!({"customer_id": "c-42", "include_history": true}),
            )
            .await
            .expect("runs");
        assert_eq!(with["history"].as_array().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn knowledge_base_echoes_query() {
        let value = registry()
            .execute("query_knowledge_base", json!({"query": "remote work"}))
            .await
            .expect("runs");
        assert_eq!(value["query"], json!("remote work"));
        assert_eq!(value["total_results"], json!(1));
    }
}
