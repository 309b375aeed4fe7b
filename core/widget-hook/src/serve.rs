//! Line-delimited JSON request loop over stdin/stdout.
//!
//! Every input line gets exactly one response line, in order. A bad line is
//! answered with an error response and the loop carries on; only a broken
//! output stream ends it early.

use std::io::{BufRead, Read, Write};

use widget_core::{StorageConfig, WidgetEngine};
use widget_protocol::{codes, ErrorInfo, Request, Response, MAX_REQUEST_BYTES};

use crate::dispatch;

pub fn run<R: BufRead, W: Write>(
    engine: &WidgetEngine,
    storage: &StorageConfig,
    mut input: R,
    mut output: W,
) -> Result<(), String> {
    tracing::info!(root = %storage.root().display(), "Serving requests");
    let mut handled = 0usize;

    while let Some(line) = read_request(&mut input)? {
        let response = match line {
            Ok(request) => dispatch::handle_request(engine, storage, request),
            Err(error) => {
                tracing::warn!(code = %error.code, message = %error.message, "Unreadable request");
                Response::error_with_info(None, error)
            }
        };
        write_response(&mut output, &response)?;
        handled += 1;
    }

    tracing::info!(requests = handled, "Input closed, exiting");
    Ok(())
}

/// Reads the next non-blank line. `Ok(None)` at end of input.
fn read_request<R: BufRead>(input: &mut R) -> Result<Option<Result<Request, ErrorInfo>>, String> {
    loop {
        let mut buffer = Vec::new();
        let limit = MAX_REQUEST_BYTES as u64 + 1;
        let n = input
            .by_ref()
            .take(limit)
            .read_until(b'\n', &mut buffer)
            .map_err(|e| format!("Failed to read stdin: {}", e))?;
        if n == 0 {
            return Ok(None);
        }

        if buffer.last() != Some(&b'\n') && buffer.len() > MAX_REQUEST_BYTES {
            skip_line(input)?;
            return Ok(Some(Err(ErrorInfo::new(
                codes::REQUEST_TOO_LARGE,
                "request exceeded maximum size",
            ))));
        }

        if buffer.iter().all(|b| b.is_ascii_whitespace()) {
            continue;
        }

        let parsed = serde_json::from_slice(&buffer).map_err(|err| {
            ErrorInfo::new(
                codes::INVALID_JSON,
                format!("request was not valid JSON: {}", err),
            )
        });
        return Ok(Some(parsed));
    }
}

/// Discards the rest of an oversized line.
fn skip_line<R: BufRead>(input: &mut R) -> Result<(), String> {
    loop {
        let buf = input
            .fill_buf()
            .map_err(|e| format!("Failed to read stdin: {}", e))?;
        if buf.is_empty() {
            return Ok(());
        }
        match buf.iter().position(|b| *b == b'\n') {
            Some(index) => {
                input.consume(index + 1);
                return Ok(());
            }
            None => {
                let len = buf.len();
                input.consume(len);
            }
        }
    }
}

fn write_response<W: Write>(output: &mut W, response: &Response) -> Result<(), String> {
    serde_json::to_writer(&mut *output, response)
        .map_err(|e| format!("Failed to encode response: {}", e))?;
    output
        .write_all(b"\n")
        .and_then(|()| output.flush())
        .map_err(|e| format!("Failed to write response: {}", e))
}
