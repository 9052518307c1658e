//! Command-line client for the tradedir API.

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use serde_json::Value;
use std::io;
use std::time::{Duration, Instant};
use tradedir_core::{ADMIN_TOKEN_HEADER, DEFAULT_CLI_SERVER_URL, USER_ID_HEADER};

#[derive(Parser)]
#[command(name = "tdir", about = "tradedir CLI", version)]
struct Cli {
    /// Server URL (can also be set via TRADEDIR_SERVER env var)
    #[arg(short, long, env = "TRADEDIR_SERVER")]
    server: Option<String>,

    /// Act as this user id
    #[arg(short, long, env = "TRADEDIR_USER", global = true)]
    user: Option<String>,

    /// Admin token for admin commands
    #[arg(long, env = "TRADEDIR_ADMIN_TOKEN", hide_env_values = true, global = true)]
    admin_token: Option<String>,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    json: bool,

    /// Print timing for API requests
    #[arg(long, global = true)]
    timing: bool,

    /// Request timeout in seconds
    #[arg(short = 't', long, default_value = "30")]
    timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
    /// Search the directory
    Search {
        /// Comma-separated offered tags (any match)
        #[arg(long)]
        offers: Option<String>,
        /// Comma-separated wanted tags (any match)
        #[arg(long)]
        wants: Option<String>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        city: Option<String>,
        #[arg(long)]
        country: Option<String>,
        /// Only tags added at or after this RFC 3339 timestamp
        #[arg(long)]
        since: Option<String>,
        #[arg(short, long, default_value = "1")]
        page: usize,
        #[arg(long)]
        page_size: Option<usize>,
    },
    /// Show one entity
    Get { id: String },
    /// List categories
    Categories {
        /// Case-insensitive name filter
        #[arg(long)]
        name: Option<String>,
        #[arg(short, long, default_value = "1")]
        page: usize,
        #[arg(long)]
        page_size: Option<usize>,
    },
    /// Suggest tags by prefix
    Tags {
        prefix: String,
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Rebuild the server's search index (admin)
    Restore,
    /// Show queued background work (admin)
    Outbox,
}

fn log_timing(timing: bool, label: &str, request: Duration, parse: Duration) {
    if !timing {
        return;
    }
    let total = request + parse;
    eprintln!(
        "[timing] {}: request {:.1} ms, parse {:.1} ms, total {:.1} ms",
        label,
        request.as_secs_f64() * 1000.0,
        parse.as_secs_f64() * 1000.0,
        total.as_secs_f64() * 1000.0
    );
}

fn error_message_for_response(status: reqwest::StatusCode, body: &str) -> String {
    if body.trim().is_empty() {
        return status
            .canonical_reason()
            .unwrap_or("Request failed")
            .to_string();
    }

    if let Ok(value) = serde_json::from_str::<Value>(body) {
        return value
            .get("error")
            .and_then(|v| v.as_str())
            .unwrap_or(body)
            .to_string();
    }

    body.to_string()
}

async fn ensure_success_or_exit(res: reqwest::Response, action: &str) -> reqwest::Response {
    let status = res.status();
    if status.is_success() {
        return res;
    }

    let body = match res.text().await {
        Ok(body) => body,
        Err(err) => format!("failed to read error response body: {}", err),
    };
    let message = error_message_for_response(status, &body);
    eprintln!("{} failed ({}): {}", action, status, message);
    std::process::exit(1);
}

/// Send a request, exit on a non-success status, and decode the JSON body.
async fn fetch_json(
    request: reqwest::RequestBuilder,
    action: &str,
    timing: bool,
) -> Result<Value, reqwest::Error> {
    let request_start = Instant::now();
    let res = request.send().await?;
    let request_elapsed = request_start.elapsed();
    let res = ensure_success_or_exit(res, action).await;

    let parse_start = Instant::now();
    let value: Value = res.json().await?;
    log_timing(
        timing,
        &action.to_lowercase(),
        request_elapsed,
        parse_start.elapsed(),
    );
    Ok(value)
}

fn print_or_exit(action: &str, output: Result<String, String>) {
    match output {
        Ok(output) => {
            if !output.is_empty() {
                println!("{}", output);
            }
        }
        Err(message) => {
            eprintln!("{} failed: {}", action, message);
            std::process::exit(1);
        }
    }
}

fn pretty(value: &Value) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|err| format!("response encoding error: {}", err))
}

fn field<'a>(value: &'a Value, key: &str, context: &str) -> Result<&'a Value, String> {
    value
        .get(key)
        .ok_or_else(|| format!("{} missing '{}' field", context, key))
}

fn str_field<'a>(value: &'a Value, key: &str, context: &str) -> Result<&'a str, String> {
    field(value, key, context)?
        .as_str()
        .ok_or_else(|| format!("{} field '{}' is not a string", context, key))
}

fn tag_names(value: &Value) -> String {
    value
        .as_array()
        .map(|tags| {
            tags.iter()
                .filter_map(|tag| tag.get("name").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join(",")
        })
        .unwrap_or_default()
}

fn page_items<'a>(page: &'a Value) -> Result<&'a Vec<Value>, String> {
    field(page, "items", "response")?
        .as_array()
        .ok_or_else(|| "response field 'items' is not an array".to_string())
}

fn page_footer(page: &Value) -> String {
    format!(
        "page {} of {} ({} results)",
        page.get("page").and_then(Value::as_u64).unwrap_or(0),
        page.get("total_pages").and_then(Value::as_u64).unwrap_or(0),
        page.get("number_of_results")
            .and_then(Value::as_u64)
            .unwrap_or(0)
    )
}

fn format_entity_page(page: &Value, json: bool) -> Result<String, String> {
    if json {
        return pretty(page);
    }

    let items = page_items(page)?;
    let mut rows = Vec::with_capacity(items.len() + 1);
    for (index, entity) in items.iter().enumerate() {
        let context = format!("response item {}", index);
        let id = str_field(entity, "id", &context)?;
        let name = str_field(entity, "name", &context)?;
        let status = str_field(entity, "status", &context)?;
        rows.push(format!(
            "{:<36} {:<30} {:<8} offers: {} | wants: {}",
            id,
            name,
            status,
            tag_names(&entity["offers"]),
            tag_names(&entity["wants"])
        ));
    }
    rows.push(page_footer(page));
    Ok(rows.join("\n"))
}

fn format_entity(entity: &Value, json: bool) -> Result<String, String> {
    if json {
        return pretty(entity);
    }

    let name = str_field(entity, "name", "response")?;
    let email = str_field(entity, "email", "response")?;
    let status = str_field(entity, "status", "response")?;
    let categories = entity
        .get("categories")
        .and_then(Value::as_array)
        .map(|names| {
            names
                .iter()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join(", ")
        })
        .unwrap_or_default();
    Ok(format!(
        "{} <{}> [{}]\ncategories: {}\noffers: {}\nwants: {}",
        name,
        email,
        status,
        categories,
        tag_names(&entity["offers"]),
        tag_names(&entity["wants"])
    ))
}

fn format_category_page(page: &Value, json: bool) -> Result<String, String> {
    if json {
        return pretty(page);
    }

    let items = page_items(page)?;
    let mut rows = Vec::with_capacity(items.len() + 1);
    for (index, category) in items.iter().enumerate() {
        let context = format!("response item {}", index);
        rows.push(format!(
            "{:<36} {}",
            str_field(category, "id", &context)?,
            str_field(category, "name", &context)?
        ));
    }
    rows.push(page_footer(page));
    Ok(rows.join("\n"))
}

fn format_tags(tags: &Value, json: bool) -> Result<String, String> {
    if json {
        return pretty(tags);
    }

    let tags = tags
        .as_array()
        .ok_or_else(|| "response is not an array".to_string())?;
    let mut rows = Vec::with_capacity(tags.len());
    for (index, tag) in tags.iter().enumerate() {
        rows.push(str_field(tag, "name", &format!("response item {}", index))?.to_string());
    }
    Ok(rows.join("\n"))
}

fn format_restore_report(report: &Value, json: bool) -> Result<String, String> {
    if json {
        return pretty(report);
    }

    let collections = field(report, "collections", "response")?
        .as_array()
        .ok_or_else(|| "response field 'collections' is not an array".to_string())?;
    let mut rows = Vec::with_capacity(collections.len());
    for collection in collections {
        let count = |key: &str| collection.get(key).and_then(Value::as_u64).unwrap_or(0);
        rows.push(format!(
            "{:<10} indexed={} pruned={} failed={} ({} ms)",
            str_field(collection, "collection", "collection report")?,
            count("indexed"),
            count("pruned"),
            count("failed"),
            count("elapsed_ms")
        ));
    }
    Ok(rows.join("\n"))
}

fn format_outbox_status(status: &Value, json: bool) -> Result<String, String> {
    if json {
        return pretty(status);
    }

    let pending = field(status, "pending", "response")?
        .as_u64()
        .ok_or_else(|| "response field 'pending' is not a number".to_string())?;
    let in_flight = status
        .get("in_flight")
        .and_then(Value::as_u64)
        .unwrap_or(0);
    let faulted = status
        .get("index_faulted")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let mut rows = vec![format!(
        "pending: {}  in flight: {}  index: {}",
        pending,
        in_flight,
        if faulted { "FAULTED (run restore)" } else { "ok" }
    )];
    if let Some(items) = status.get("oldest").and_then(Value::as_array) {
        for item in items {
            rows.push(format!(
                "  #{:<8} {:<16} attempts={}",
                item.get("seq").and_then(Value::as_u64).unwrap_or(0),
                item.get("kind").and_then(Value::as_str).unwrap_or("?"),
                item.get("attempts").and_then(Value::as_u64).unwrap_or(0)
            ));
        }
    }
    Ok(rows.join("\n"))
}

fn api_url(server: &str, segments: &[&str]) -> Result<reqwest::Url, String> {
    let mut url = reqwest::Url::parse(server)
        .map_err(|err| format!("Invalid server URL '{}': {}", server, err))?;
    let mut path = url
        .path_segments_mut()
        .map_err(|_| "Server URL cannot be used as an API base".to_string())?;
    path.pop_if_empty();
    for segment in segments {
        path.push(segment);
    }
    drop(path);
    Ok(url)
}

fn api_url_or_exit(server: &str, action: &str, segments: &[&str]) -> reqwest::Url {
    match api_url(server, segments) {
        Ok(url) => url,
        Err(message) => {
            eprintln!("{} failed: {}", action, message);
            std::process::exit(1);
        }
    }
}

fn normalize_server(server: String) -> String {
    if let Ok(mut url) = reqwest::Url::parse(&server) {
        let should_normalize_localhost =
            url.scheme().eq_ignore_ascii_case("http") && url.host_str() == Some("localhost");
        if should_normalize_localhost && url.set_host(Some("127.0.0.1")).is_err() {
            return server;
        }
        let mut normalized = url.to_string();
        while normalized.ends_with('/') {
            normalized.pop();
        }
        return normalized;
    }
    server
}

fn explicit_server_override(server: Option<String>) -> Option<String> {
    server.and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn resolve_server(server: Option<String>) -> String {
    explicit_server_override(server).unwrap_or_else(|| DEFAULT_CLI_SERVER_URL.to_string())
}

/// Query pairs for an entity search, skipping unset filters.
#[allow(clippy::too_many_arguments)]
fn search_query(
    offers: Option<String>,
    wants: Option<String>,
    category: Option<String>,
    name: Option<String>,
    city: Option<String>,
    country: Option<String>,
    since: Option<String>,
    page: usize,
    page_size: Option<usize>,
) -> Vec<(&'static str, String)> {
    let mut query = vec![("page", page.to_string())];
    if let Some(size) = page_size {
        query.push(("page_size", size.to_string()));
    }
    let optional = [
        ("offers", offers),
        ("wants", wants),
        ("category", category),
        ("name", name),
        ("city", city),
        ("country", country),
        ("tagged_since", since),
    ];
    for (key, value) in optional {
        if let Some(value) = value.filter(|value| !value.trim().is_empty()) {
            query.push((key, value));
        }
    }
    query
}

fn with_identity(
    request: reqwest::RequestBuilder,
    user: Option<&str>,
    admin_token: Option<&str>,
) -> reqwest::RequestBuilder {
    let request = match user {
        Some(user) => request.header(USER_ID_HEADER, user),
        None => request,
    };
    match admin_token {
        Some(token) => request.header(ADMIN_TOKEN_HEADER, token),
        None => request,
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let Cli {
        server,
        user,
        admin_token,
        json,
        timing,
        timeout,
        command,
    } = Cli::parse();

    if let Commands::Completions { shell } = &command {
        let mut cmd = Cli::command();
        let name = cmd.get_name().to_string();
        generate(*shell, &mut cmd, name, &mut io::stdout());
        return Ok(());
    }

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout))
        .build()?;
    let server = normalize_server(resolve_server(server));
    let user = user.as_deref();
    let admin_token = admin_token.as_deref();

    match command {
        Commands::Completions { .. } => unreachable!("completions handled before client setup"),
        Commands::Search {
            offers,
            wants,
            category,
            name,
            city,
            country,
            since,
            page,
            page_size,
        } => {
            let endpoint = api_url_or_exit(&server, "Search", &["api", "entities"]);
            let query = search_query(
                offers, wants, category, name, city, country, since, page, page_size,
            );
            let request = with_identity(client.get(endpoint).query(&query), user, None);
            let page = fetch_json(request, "Search", timing).await?;
            print_or_exit("Search", format_entity_page(&page, json));
        }
        Commands::Get { id } => {
            let endpoint = api_url_or_exit(&server, "Get", &["api", "entities", id.as_str()]);
            let request = with_identity(client.get(endpoint), user, None);
            let entity = fetch_json(request, "Get", timing).await?;
            print_or_exit("Get", format_entity(&entity, json));
        }
        Commands::Categories {
            name,
            page,
            page_size,
        } => {
            let endpoint = api_url_or_exit(&server, "Categories", &["api", "categories"]);
            let mut query = vec![("page", page.to_string())];
            if let Some(size) = page_size {
                query.push(("page_size", size.to_string()));
            }
            if let Some(name) = name {
                query.push(("name", name));
            }
            let page = fetch_json(client.get(endpoint).query(&query), "Categories", timing).await?;
            print_or_exit("Categories", format_category_page(&page, json));
        }
        Commands::Tags { prefix, limit } => {
            let endpoint = api_url_or_exit(&server, "Tags", &["api", "tags"]);
            let mut query = vec![("prefix", prefix)];
            if let Some(limit) = limit {
                query.push(("limit", limit.to_string()));
            }
            let tags = fetch_json(client.get(endpoint).query(&query), "Tags", timing).await?;
            print_or_exit("Tags", format_tags(&tags, json));
        }
        Commands::Restore => {
            let endpoint = api_url_or_exit(&server, "Restore", &["api", "admin", "restore"]);
            let request = with_identity(client.post(endpoint), None, admin_token);
            let report = fetch_json(request, "Restore", timing).await?;
            print_or_exit("Restore", format_restore_report(&report, json));
        }
        Commands::Outbox => {
            let endpoint = api_url_or_exit(&server, "Outbox", &["api", "admin", "outbox"]);
            let request = with_identity(client.get(endpoint), None, admin_token);
            let status = fetch_json(request, "Outbox", timing).await?;
            print_or_exit("Outbox", format_outbox_status(&status, json));
        }
    }

    Ok(())
}
