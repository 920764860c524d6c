//! Helpers shared by direct and debugger launches.

use std::future::Future;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tokio::process::Child;

async fn next_line<R: AsyncBufRead + Unpin>(lines: &mut Option<Lines<R>>) -> Option<String> {
    match lines {
        Some(lines) => lines.next_line().await.ok().flatten(),
        None => None,
    }
}

/// Reads stdout and stderr line by line until both are closed, passing each
/// line to `sink`. When `stop` resolves first the child is killed and the
/// remaining output is still drained.
///
/// Returns true if the child was killed.
pub(crate) async fn drain_child<S, F>(child: &mut Child, mut sink: S, stop: F) -> bool
where
    S: FnMut(String),
    F: Future<Output = ()>,
{
    let mut stdout = child.stdout.take().map(|s| BufReader::new(s).lines());
    let mut stderr = child.stderr.take().map(|s| BufReader::new(s).lines());
    let mut out_open = stdout.is_some();
    let mut err_open = stderr.is_some();
    let mut killed = false;
    tokio::pin!(stop);

    while out_open || err_open {
        tokio::select! {
            line = next_line(&mut stdout), if out_open => match line {
                Some(line) => sink(line),
                None => out_open = false,
            },
            line = next_line(&mut stderr), if err_open => match line {
                Some(line) => sink(line),
                None => err_open = false,
            },
            _ = &mut stop, if !killed => {
                killed = true;
                let _ = child.start_kill();
            }
        }
    }

    if !killed {
        // Pipes can close before exit; honour a stop request that arrives meanwhile.
        tokio::select! {
            biased;
            _ = child.wait() => {}
            _ = &mut stop => {
                killed = true;
                let _ = child.start_kill();
            }
        }
    }

    killed
}
