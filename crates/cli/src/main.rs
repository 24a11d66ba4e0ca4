use std::str::FromStr;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand, ValueEnum};
use formsync_core::{classes, csrf, ids, shared, with_form, Field, FieldRef, Form, Row, SelectField, SharedForm};
use formsync_http::{ClientConfig, ReqwestTransport, Transport, LOG_ENV, METRICS_ADDR_ENV};
use formsync_page::{AdminPage, PageEvent};
use serde::Serialize;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "formsyncctl", version, about = "Run the admin form helpers against a live server")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    /// Server base URL
    #[arg(long = "base-url", global = true, env = "FORMSYNC_BASE_URL")]
    base_url: Option<String>,

    /// Request timeout in milliseconds (0 disables)
    #[arg(long = "timeout-ms", global = true, env = "FORMSYNC_TIMEOUT_MS")]
    timeout_ms: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output { Human, Json }

#[derive(Subcommand, Debug)]
enum Commands {
    /// Load the branches offered for a customer
    Branches {
        customer: String,
        /// Branch id already saved on the record
        #[arg(long = "preserve")]
        preserve: Option<String>,
    },
    /// Load the outstanding orders offered for a payment
    Orders {
        payment: String,
        /// Order id already saved on the record
        #[arg(long = "preserve")]
        preserve: Option<String>,
    },
    /// Pick a product in a line item: default stem length, then price
    Autofill {
        #[arg(long = "customer")]
        customer: String,
        #[arg(long = "product")]
        product: String,
        /// Cookie string carrying the CSRF token, e.g. "csrftoken=..."
        #[arg(long = "cookie", env = "FORMSYNC_COOKIE", default_value = "")]
        cookie: String,
    },
    /// Look up the price for a customer/product/stem length
    Price {
        #[arg(long = "customer")]
        customer: String,
        #[arg(long = "product")]
        product: String,
        #[arg(long = "stem-length")]
        stem_length: String,
    },
    /// Extract the CSRF token from a cookie string
    Csrf {
        #[arg(long = "cookies")]
        cookies: String,
        #[arg(long = "name", default_value = csrf::DEFAULT_COOKIE)]
        name: String,
    },
}

fn init_tracing() {
    let env = std::env::var(LOG_ENV).unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr).init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var(METRICS_ADDR_ENV) {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => tracing::info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => tracing::warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            tracing::warn!(var = METRICS_ADDR_ENV, addr = %addr, "invalid metrics address; expected host:port");
        }
    }
}

/// Select offering exactly `value`, selected.
fn chosen(value: &str) -> SelectField {
    SelectField::with_options([("", formsync_core::PLACEHOLDER_LABEL), (value, value)], Some(value))
}

#[derive(Serialize)]
struct Report<'a> {
    events: &'a [PageEvent],
    form: &'a Form,
}

fn print_report(output: Output, events: &[PageEvent], form: &SharedForm) -> Result<()> {
    let snapshot = with_form(form, |f| f.clone());
    match output {
        Output::Json => println!("{}", serde_json::to_string_pretty(&Report { events, form: &snapshot })?),
        Output::Human => {
            for ev in events {
                println!("{}", serde_json::to_string(ev)?);
            }
            for id in [ids::BRANCH, ids::ORDER] {
                if let Ok(Field::Select(s)) = snapshot.field(&FieldRef::id(id)) {
                    println!("{} ({:?}{})", id, s.state(), if s.is_disabled() { ", disabled" } else { "" });
                    for o in s.options() {
                        let mark = if o.selected { "*" } else { " " };
                        println!("  {} {:<8} {}", mark, o.value, o.label);
                    }
                }
            }
            for (i, _) in snapshot.rows().iter().enumerate() {
                let get = |class: &str| snapshot.value(&FieldRef::row(i, class)).unwrap_or_default();
                println!(
                    "row {}: product={} stem_length={} price={}",
                    i,
                    get(classes::PRODUCT),
                    get(classes::STEM_LENGTH),
                    get(classes::PRICE)
                );
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();

    let mut cfg = ClientConfig::from_env();
    if let Some(url) = cli.base_url.clone() {
        cfg.base_url = url;
    }
    if let Some(ms) = cli.timeout_ms {
        cfg.timeout_ms = if ms == 0 { None } else { Some(ms) };
    }

    let (form, trigger) = match cli.command {
        Commands::Csrf { cookies, name } => {
            let Some(token) = csrf::cookie_value(&cookies, &name) else {
                return Err(anyhow!("cookie {} not present", name));
            };
            match cli.output {
                Output::Human => println!("{}", token),
                Output::Json => println!("{}", serde_json::json!({ "name": name, "token": token })),
            }
            return Ok(());
        }
        Commands::Branches { customer, preserve } => {
            let child = preserve.as_deref().map(chosen).unwrap_or_default();
            let form = Form::new().with_field(ids::CUSTOMER, chosen(&customer)).with_field(ids::BRANCH, child);
            (form, None)
        }
        Commands::Orders { payment, preserve } => {
            let child = preserve.as_deref().map(chosen).unwrap_or_default();
            let form = Form::new().with_field(ids::PAYMENT, chosen(&payment)).with_field(ids::ORDER, child);
            (form, None)
        }
        Commands::Autofill { customer, product, cookie } => {
            let form = Form::new()
                .with_field(ids::CUSTOMER, chosen(&customer))
                .with_row(Row::line_item([(product.as_str(), product.as_str())]))
                .with_cookie(cookie);
            (form, Some((FieldRef::row(0, classes::PRODUCT), product)))
        }
        Commands::Price { customer, product, stem_length } => {
            let mut form = Form::new()
                .with_field(ids::CUSTOMER, chosen(&customer))
                .with_row(Row::line_item([(product.as_str(), product.as_str())]));
            form.set_value(&FieldRef::row(0, classes::PRODUCT), &product)?;
            (form, Some((FieldRef::row(0, classes::STEM_LENGTH), stem_length)))
        }
    };

    let transport: Arc<dyn Transport> = Arc::new(ReqwestTransport::new(&cfg)?);
    info!(base_url = %cfg.base_url, timeout_ms = ?cfg.timeout_ms, "client ready");
    let form = shared(form);
    let page = AdminPage::standard(form.clone(), transport, &cfg);
    let events = match trigger {
        None => page.ready().await,
        Some((target, value)) => page.change(&target, &value).await?.into_iter().collect(),
    };
    print_report(cli.output, &events, &form)
}
