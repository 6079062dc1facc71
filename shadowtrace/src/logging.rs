//! Diagnostic log output.
//!
//! Events carry the wire header `[<tag>] [<pid>, 0x<tid> (<thread>)] ` with
//! a single-letter level tag, optionally wrapped in a 256-color ANSI escape
//! when stderr is a terminal.

use crate::thread::current_thread_id;
use std::io::IsTerminal;
use std::sync::OnceLock;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::EnvFilter;

static INIT_GUARD: OnceLock<()> = OnceLock::new();

/// 256-color foregrounds for the level tags.
const INFO_TAG_FG: u8 = 61;
const WARNING_TAG_FG: u8 = 60;
const ERROR_TAG_FG: u8 = 9;

struct HeaderFormat {
    ansi: bool,
}

impl HeaderFormat {
    fn tag(level: Level) -> &'static str {
        match level {
            Level::ERROR => "e",
            Level::WARN => "w",
            Level::INFO => "i",
            Level::DEBUG => "d",
            Level::TRACE => "t",
        }
    }

    fn tag_color(tag: &str) -> u8 {
        match tag {
            "i" => INFO_TAG_FG,
            "w" => WARNING_TAG_FG,
            _ => ERROR_TAG_FG,
        }
    }
}

impl<S, N> FormatEvent<S, N> for HeaderFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> std::fmt::Result {
        let tag = Self::tag(*event.metadata().level());
        if self.ansi {
            write!(
                writer,
                "\u{1b}[38;5;{}m[{}]\u{1b}[0m",
                Self::tag_color(tag),
                tag
            )?;
        } else {
            write!(writer, "[{tag}]")?;
        }

        // The header reads the std thread name, never the tracer's thread
        // record: events can fire while the tracer state is borrowed.
        let thread = std::thread::current();
        write!(
            writer,
            " [{}, 0x{:x} ({})] ",
            std::process::id(),
            current_thread_id(),
            thread.name().unwrap_or("anon")
        )?;

        ctx.field_format().format_fields(writer.by_ref(), event)?;
        write!(writer, "\r\n")
    }
}

/// Install the stderr diagnostic subscriber. Level selection follows
/// `RUST_LOG`; repeated calls and foreign subscribers are tolerated.
pub fn init_logging() {
    if INIT_GUARD.set(()).is_err() {
        // Already initialized elsewhere; do nothing and succeed
        return;
    }

    let ansi = std::io::stderr().is_terminal();
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .event_format(HeaderFormat { ansi })
        .try_init();
}
