use anyhow::anyhow;

use crate::cli::{OutputFormat, ViewArgs};
use crate::client::{AppContext, CliError, CliResult};
use crate::commands::predict::fetch_images;
use crate::navigator::{SliceNavigator, ViewState};
use crate::output::render_slice;

pub(crate) async fn handle_view(
    ctx: &AppContext,
    args: ViewArgs,
    format: OutputFormat,
) -> CliResult<()> {
    let mut navigator = SliceNavigator::new();
    let ticket = navigator.select(args.patient);

    match fetch_images(ctx, ticket.patient()).await {
        Ok(listing) => {
            navigator.complete(&ticket, Ok(listing));
        }
        Err(err) => {
            navigator.complete(&ticket, Err(err.to_string()));
            return Err(err);
        }
    }

    navigator.seek(args.slice);
    match (navigator.state(), navigator.current_slice()) {
        (ViewState::Ready { patient, .. }, Some(view)) => render_slice(patient, &view, format),
        (ViewState::Failed { patient, message }, _) => Err(CliError::failure(anyhow!(
            "cannot view patient {patient}: {message}"
        ))),
        _ => Err(CliError::failure(anyhow!("image listing was not applied"))),
    }
}
