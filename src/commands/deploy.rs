// ABOUTME: Deploy, retry, and redeploy command implementations.
// ABOUTME: Starts a background run and follows its log stream to the end.

use futures::StreamExt;

use super::Context;
use cloudship::error::{Error, Result};
use cloudship::output::Output;
use cloudship::service::Started;
use cloudship::types::DeploymentId;

pub async fn deploy(ctx: &Context, branch: Option<&str>, output: &Output) -> Result<()> {
    let input = ctx.config.new_deployment(branch)?;
    output.progress(&format!(
        "Deploying {} ({}) to {} {}",
        ctx.project.name, input.branch, input.provider, input.region
    ));

    let started = ctx
        .service
        .start(ctx.project.clone(), input, ctx.token.clone())
        .await?;
    finish(ctx, started, output).await
}

pub async fn retry(ctx: &Context, id: &DeploymentId, output: &Output) -> Result<()> {
    output.progress(&format!("Retrying deployment {id}"));
    let started = ctx
        .service
        .retry(id, ctx.project.clone(), ctx.token.clone())
        .await?;
    finish(ctx, started, output).await
}

pub async fn redeploy(ctx: &Context, id: &DeploymentId, output: &Output) -> Result<()> {
    output.progress(&format!("Redeploying onto the instance of {id}"));
    let started = ctx
        .service
        .redeploy(id, ctx.project.clone(), ctx.token.clone())
        .await?;
    finish(ctx, started, output).await
}

/// Follow the run's log until its final event, then report the outcome. The
/// run lives on this process's runtime, so the command always waits for it.
async fn finish(ctx: &Context, started: Started, output: &Output) -> Result<()> {
    let id = started.record.id.clone();

    output.progress(&format!("Deployment {id}"));
    let mut stream = ctx.service.stream(&id).await?;
    while let Some(event) = stream.next().await {
        output.stream_event(&event);
        if event.is_final() {
            break;
        }
    }

    let report = started
        .handle
        .await
        .map_err(|e| Error::DeploymentFailed(format!("deployment task aborted: {e}")))?;
    let Some(report) = report else {
        return Err(Error::DeploymentFailed(format!(
            "deployment {id} was not pending and did not run"
        )));
    };

    for warning in &report.warnings {
        output.warning(warning);
    }

    if report.succeeded() {
        let url = report.public_url.as_deref().unwrap_or("(no url)");
        output.success(&format!("Deployment {id} live at {url}"));
        Ok(())
    } else {
        Err(Error::DeploymentFailed(
            report
                .error_message
                .unwrap_or_else(|| format!("deployment {id} ended as {}", report.status)),
        ))
    }
}
