// ABOUTME: Read-only commands: status, list, and logs.
// ABOUTME: Every read goes through the service's timed store access.

use super::Context;
use cloudship::error::Result;
use cloudship::output::{Output, OutputMode};
use cloudship::store::DeploymentFilter;
use cloudship::types::DeploymentId;

pub async fn status(ctx: &Context, id: &DeploymentId, output: &Output) -> Result<()> {
    let record = ctx.service.status(id).await?;
    output.record(&record);
    Ok(())
}

pub async fn list(ctx: &Context, output: &Output) -> Result<()> {
    let filter = DeploymentFilter::for_project(ctx.project.id.clone());
    let records = ctx.service.list(&filter).await?;

    if output.mode() == OutputMode::Normal && records.is_empty() {
        output.progress(&format!("No deployments for {}", ctx.project.name));
        return Ok(());
    }

    for record in &records {
        match output.mode() {
            OutputMode::Normal => println!(
                "{}  {:<12} {}  {}",
                record.id,
                record.status,
                record.created_at.format("%Y-%m-%d %H:%M:%S"),
                record.public_url.as_deref().unwrap_or("-")
            ),
            OutputMode::Quiet | OutputMode::Json => output.record(record),
        }
    }
    Ok(())
}

pub async fn logs(ctx: &Context, id: &DeploymentId, output: &Output) -> Result<()> {
    let snapshot = ctx.service.logs(id).await?;
    output.logs(&snapshot, &snapshot.logs);
    Ok(())
}
