// ABOUTME: Commands that change a deployment outside a run: cancel and destroy.
// ABOUTME: Destroy failures are reported but the underlying error stays in the log.

use super::Context;
use cloudship::error::{Error, Result};
use cloudship::output::Output;
use cloudship::types::DeploymentId;

pub async fn cancel(ctx: &Context, id: &DeploymentId, output: &Output) -> Result<()> {
    let record = ctx.service.cancel(id).await?;
    output.success(&format!("Deployment {} {}", record.id, record.status));
    Ok(())
}

pub async fn destroy(ctx: &Context, id: &DeploymentId, output: &Output) -> Result<()> {
    // Fails early on unknown ids rather than destroying nothing quietly.
    ctx.service.status(id).await?;

    output.progress(&format!("Destroying infrastructure for {id}..."));
    if ctx.service.destroy(id).await {
        output.success(&format!("Infrastructure for {id} destroyed"));
        Ok(())
    } else {
        Err(Error::DeploymentFailed(format!(
            "could not destroy infrastructure for {id}; run with -v for details"
        )))
    }
}
