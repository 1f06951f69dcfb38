//! Subcommand implementations for `shutdownctl`.
//!
//! Each command resolves its instance set, calls the [`ShutdownManager`],
//! and prints one row per instance. Batch reads that come back empty are
//! reported as indeterminate and fail the process.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context as _, Result};
use clap::ValueEnum;
use serde_json::{json, Value};
use tracing::{debug, info};

use warpgrid_kv::KvStore;
use warpgrid_shutdown::{
    confirmation_timestamp, parse_duration, InstanceDetails, InstanceDirectory, ShutdownConfig,
    ShutdownManager, ShutdownManagerOptions, StaticDirectory, TracingAudit,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// One output line: instance id and its value.
pub type Row = (String, Value);

/// Load `shutdown.toml` from `path`, or fall back to built-in defaults.
pub fn load_config(path: Option<&Path>) -> Result<ShutdownConfig> {
    match path {
        Some(path) => {
            let config = ShutdownConfig::from_file(path)
                .with_context(|| format!("failed to load {}", path.display()))?;
            debug!(path = %path.display(), "loaded config");
            Ok(config)
        }
        None => {
            debug!("no config given, using defaults");
            Ok(ShutdownConfig::default())
        }
    }
}

pub struct Context {
    manager: ShutdownManager,
    directory: StaticDirectory,
    config: ShutdownConfig,
    format: OutputFormat,
}

impl Context {
    pub fn new(config: ShutdownConfig, store: Arc<dyn KvStore>, format: OutputFormat) -> Result<Self> {
        let manager = ShutdownManager::new(ShutdownManagerOptions {
            store,
            shutdown_ttl: config.shutdown_ttl()?,
            audit: Arc::new(TracingAudit),
        });
        let directory = StaticDirectory::new(config.instances.clone());
        Ok(Self {
            manager,
            directory,
            config,
            format,
        })
    }

    /// Explicit ids resolved against the directory, or the whole directory.
    async fn resolve(&self, ids: &[String], all: bool) -> Result<Vec<InstanceDetails>> {
        let instances = if all {
            self.directory.list_instances().await?
        } else {
            self.directory.lookup(ids)
        };
        if instances.is_empty() {
            if all {
                bail!("no instances configured; add [[instances]] to the config or pass ids");
            }
            bail!("no instance ids given; pass ids or --all");
        }
        Ok(instances)
    }

    async fn resolve_ids(&self, ids: &[String], all: bool) -> Result<Vec<String>> {
        Ok(self
            .resolve(ids, all)
            .await?
            .into_iter()
            .map(|i| i.instance_id)
            .collect())
    }

    fn emit(&self, rows: &[Row]) -> Result<()> {
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        render(self.format, rows, &mut out)?;
        out.flush()?;
        Ok(())
    }
}

// ── Commands ───────────────────────────────────────────────────────

pub async fn request(ctx: &Context, ids: &[String], all: bool, status: &str) -> Result<()> {
    let rows = request_rows(ctx, ids, all, status).await?;
    ctx.emit(&rows)
}

pub async fn status(ctx: &Context, ids: &[String], all: bool) -> Result<()> {
    let rows = status_rows(ctx, ids, all).await?;
    ctx.emit(&rows)
}

pub async fn confirm(ctx: &Context, ids: &[String], all: bool, value: Option<&str>) -> Result<()> {
    let rows = confirm_rows(ctx, ids, all, value).await?;
    ctx.emit(&rows)
}

pub async fn confirmations(ctx: &Context, ids: &[String], all: bool) -> Result<()> {
    let rows = confirmation_rows(ctx, ids, all).await?;
    ctx.emit(&rows)
}

pub async fn protect(ctx: &Context, id: &str, ttl: Option<&str>, mode: &str) -> Result<()> {
    let rows = protect_rows(ctx, id, ttl, mode).await?;
    ctx.emit(&rows)
}

pub async fn protected(ctx: &Context, ids: &[String], all: bool) -> Result<()> {
    let rows = protected_rows(ctx, ids, all).await?;
    ctx.emit(&rows)
}

// ── Row builders ───────────────────────────────────────────────────

async fn request_rows(ctx: &Context, ids: &[String], all: bool, status: &str) -> Result<Vec<Row>> {
    let instances = ctx.resolve(ids, all).await?;
    if !ctx.manager.set_shutdown_status_with(&instances, status).await {
        bail!(
            "failed to write shutdown status for {} instance(s)",
            instances.len()
        );
    }
    info!(instances = instances.len(), %status, "shutdown requested");
    Ok(instances
        .into_iter()
        .map(|i| (i.instance_id, Value::String(status.to_string())))
        .collect())
}

async fn status_rows(ctx: &Context, ids: &[String], all: bool) -> Result<Vec<Row>> {
    let ids = ctx.resolve_ids(ids, all).await?;
    let statuses = ctx.manager.get_shutdown_statuses(&ids).await;
    zip_rows(ids, statuses, Value::Bool)
}

async fn confirm_rows(
    ctx: &Context,
    ids: &[String],
    all: bool,
    value: Option<&str>,
) -> Result<Vec<Row>> {
    let instances = ctx.resolve(ids, all).await?;
    let value = value.map_or_else(confirmation_timestamp, str::to_string);
    if !ctx
        .manager
        .set_shutdown_confirmation_with(&instances, &value)
        .await
    {
        bail!(
            "failed to write shutdown confirmation for {} instance(s)",
            instances.len()
        );
    }
    info!(instances = instances.len(), "shutdown confirmed");
    Ok(instances
        .into_iter()
        .map(|i| (i.instance_id, Value::String(value.clone())))
        .collect())
}

async fn confirmation_rows(ctx: &Context, ids: &[String], all: bool) -> Result<Vec<Row>> {
    let ids = ctx.resolve_ids(ids, all).await?;
    let confirmations = ctx.manager.get_shutdown_confirmations(&ids).await;
    zip_rows(ids, confirmations, |value| {
        value.map_or(Value::Null, Value::String)
    })
}

async fn protect_rows(ctx: &Context, id: &str, ttl: Option<&str>, mode: &str) -> Result<Vec<Row>> {
    let ttl = match ttl {
        Some(ttl) => parse_duration(ttl)?,
        None => ctx.config.protection_ttl()?,
    };
    ctx.manager
        .set_scale_down_protected_with(id, ttl, mode)
        .await
        .with_context(|| format!("failed to protect {id}"))?;
    info!(instance_id = %id, ttl_secs = ttl.as_secs(), "scale-down protection set");
    Ok(vec![(id.to_string(), json!({ "mode": mode, "ttl_secs": ttl.as_secs() }))])
}

async fn protected_rows(ctx: &Context, ids: &[String], all: bool) -> Result<Vec<Row>> {
    let ids = ctx.resolve_ids(ids, all).await?;
    let protected = ctx.manager.are_scale_down_protected(&ids).await;
    zip_rows(ids, protected, Value::Bool)
}

/// Pair ids with batch-read results. An empty result for a non-empty id
/// set is the manager's "batch failed" signal.
fn zip_rows<T>(ids: Vec<String>, values: Vec<T>, to_value: impl Fn(T) -> Value) -> Result<Vec<Row>> {
    if values.is_empty() {
        bail!("indeterminate: batch read of {} instance(s) failed", ids.len());
    }
    Ok(ids
        .into_iter()
        .zip(values)
        .map(|(id, value)| (id, to_value(value)))
        .collect())
}

// ── Output ─────────────────────────────────────────────────────────

/// Text: `<id>\t<value>` per line. JSON: a single array of objects.
pub fn render(format: OutputFormat, rows: &[Row], out: &mut impl Write) -> Result<()> {
    match format {
        OutputFormat::Text => {
            for (id, value) in rows {
                match value {
                    Value::String(s) => writeln!(out, "{id}\t{s}")?,
                    Value::Null => writeln!(out, "{id}\t-")?,
                    other => writeln!(out, "{id}\t{other}")?,
                }
            }
        }
        OutputFormat::Json => {
            let items: Vec<Value> = rows
                .iter()
                .map(|(id, value)| json!({ "instance_id": id, "value": value }))
                .collect();
            serde_json::to_writer_pretty(&mut *out, &items)?;
            writeln!(out)?;
        }
    }
    Ok(())
}
