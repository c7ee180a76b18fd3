use std::cmp::min;
use std::fmt::Write;
use std::time::{Duration, Instant};

use indicatif::{MultiProgress, ProgressBar, ProgressState, ProgressStyle};

use crate::controller::RunController;

/// Displays a progress bar for a run, showing how long is left and the live metrics.
///
/// The bar is finished when the run reaches a terminal status.
pub fn start_progress(run: RunController, multi: &MultiProgress) {
    let planned_runtime = run.scenario().run_duration();
    let pb = multi.add(ProgressBar::new(planned_runtime.as_secs()));
    pb.set_style(progress_style(planned_runtime));
    pb.set_prefix(run.scenario().id.clone());

    tokio::spawn(async move {
        let start_time = Instant::now();
        let mut snapshots = run.subscribe();

        loop {
            let snapshot = *snapshots.borrow_and_update();
            pb.set_message(format!(
                "{} req, {} err, {:.1} req/s, {:.1}% errors",
                snapshot.total_requests,
                snapshot.failure_count,
                snapshot.observed_rate_per_sec,
                snapshot.error_rate_pct
            ));

            let status = run.status();
            if status.is_terminal() {
                log::trace!("Progress for {} finished", run.scenario().id);
                pb.finish_with_message(format!(
                    "{status}: {} req, {} err",
                    snapshot.total_requests, snapshot.failure_count
                ));
                break;
            }

            let elapsed = min(start_time.elapsed().as_secs(), planned_runtime.as_secs());
            pb.set_position(elapsed);

            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(1)) => {}
                _ = run.wait() => {}
            }
        }
    });
}

fn progress_style(planned_runtime: Duration) -> ProgressStyle {
    let hours = planned_runtime.as_secs() / 3600;
    let minutes = (planned_runtime.as_secs() % 3600) / 60;
    let seconds = planned_runtime.as_secs() % 60;

    match ProgressStyle::with_template(
        "{spinner:.green} {prefix:>16} [{wide_bar:.cyan/blue}] [{elapsed_precise} / {planned_runtime}] {msg}",
    ) {
        Ok(style) => style
            .with_key(
                "planned_runtime",
                move |_state: &ProgressState, w: &mut dyn Write| {
                    let _ = write!(w, "{:02}:{:02}:{:02}", hours, minutes, seconds);
                },
            )
            .progress_chars("#>-"),
        Err(e) => {
            log::warn!("Invalid progress template, using the default style: {e}");
            ProgressStyle::default_bar()
        }
    }
}
