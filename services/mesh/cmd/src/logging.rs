use std::fmt;
use std::io::IsTerminal;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::{format::Writer, FmtContext, FormatEvent, FormatFields, FormattedFields};
use tracing_subscriber::registry::LookupSpan;

/// ANSI color codes for console output
const COLOR_RESET: &str = "\x1b[0m";
const COLOR_CYAN: &str = "\x1b[36m";
const COLOR_MAGENTA: &str = "\x1b[35m";
const COLOR_GREEN: &str = "\x1b[32m";
const COLOR_BRIGHT_YELLOW: &str = "\x1b[93m";
const COLOR_BRIGHT_RED: &str = "\x1b[91m";
const COLOR_BRIGHT_GRAY: &str = "\x1b[90m";

/// Column widths for alignment
const NODE_WIDTH: usize = 10;
const COMPONENT_WIDTH: usize = 16;
const LOG_LEVEL_WIDTH: usize = 5;

/// Span field naming the radio node an event belongs to
const NODE_FIELD: &str = "node";

/// Column formatter: `[timestamp] [node] [component] [level] message`.
///
/// The node column comes from the nearest enclosing span with a `node`
/// field, so everything a simulated node does while handling a packet is
/// attributed to it. The component is the `component` field when the
/// `component_*` macros are used, otherwise the crate and module the event
/// was logged from (`transfer.engine`, `storage.file`).
pub struct XferLogFormatter {
    color_enabled: bool,
}

/// Log with a component tag shown in the component column
#[macro_export]
macro_rules! component_info {
    ($component:expr, $($arg:tt)*) => {
        tracing::info!(component = $component, $($arg)*)
    };
}

#[macro_export]
macro_rules! component_warn {
    ($component:expr, $($arg:tt)*) => {
        tracing::warn!(component = $component, $($arg)*)
    };
}

#[macro_export]
macro_rules! component_debug {
    ($component:expr, $($arg:tt)*) => {
        tracing::debug!(component = $component, $($arg)*)
    };
}

impl XferLogFormatter {
    pub fn new() -> Self {
        Self {
            color_enabled: is_terminal(),
        }
    }

    fn color(&self, code: &'static str) -> &'static str {
        if self.color_enabled {
            code
        } else {
            ""
        }
    }

    fn level_color(&self, level: &Level) -> &'static str {
        self.color(match *level {
            Level::ERROR => COLOR_BRIGHT_RED,
            Level::WARN => COLOR_BRIGHT_YELLOW,
            Level::INFO => COLOR_GREEN,
            Level::DEBUG | Level::TRACE => COLOR_BRIGHT_GRAY,
        })
    }
}

impl Default for XferLogFormatter {
    fn default() -> Self {
        Self::new()
    }
}

/// `mesh_transfer::engine` becomes `transfer.engine`, `mesh_xfer::link` becomes `xfer.link`
fn component_from_target(target: &str) -> String {
    let mut segments = target.split("::");
    let crate_name = segments.next().unwrap_or(target);
    let crate_name = crate_name.strip_prefix("mesh_").unwrap_or(crate_name);
    match segments.last() {
        Some(module) => format!("{}.{}", crate_name, module),
        None => crate_name.to_string(),
    }
}

/// Pad or truncate to exactly `width` characters
fn fit(value: &str, width: usize) -> String {
    if value.chars().count() > width {
        let truncated: String = value.chars().take(width - 1).collect();
        format!("{}…", truncated)
    } else {
        format!("{:<width$}", value, width = width)
    }
}

/// Value of `name=` in a span's formatted fields
fn span_field<'a>(fields: &'a str, name: &str) -> Option<&'a str> {
    fields.split_whitespace().find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        (key == name).then(|| value.trim_matches('"'))
    })
}

impl<S, N> FormatEvent<S, N> for XferLogFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(&self, ctx: &FmtContext<'_, S, N>, mut writer: Writer<'_>, event: &Event<'_>) -> fmt::Result {
        let timestamp = chrono::Local::now().format("%H:%M:%S%.3f");
        let metadata = event.metadata();

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        // Innermost span wins
        let mut node = None;
        if let Some(scope) = ctx.event_scope() {
            for span in scope {
                let extensions = span.extensions();
                let found = extensions
                    .get::<FormattedFields<N>>()
                    .and_then(|fields| span_field(&fields.fields, NODE_FIELD).map(str::to_string));
                if found.is_some() {
                    node = found;
                    break;
                }
            }
        }

        let component = visitor
            .component
            .unwrap_or_else(|| component_from_target(metadata.target()));
        let level = metadata.level();
        let reset = self.color(COLOR_RESET);

        write!(
            writer,
            "{}[{}]{} [{}{}{}] [{}] [{}{:<width$}{}] ",
            self.color(COLOR_CYAN),
            timestamp,
            reset,
            self.color(COLOR_MAGENTA),
            fit(node.as_deref().unwrap_or("-"), NODE_WIDTH),
            reset,
            fit(&component, COMPONENT_WIDTH),
            self.level_color(level),
            level.as_str(),
            reset,
            width = LOG_LEVEL_WIDTH
        )?;
        writeln!(writer, "{}", visitor.message)
    }
}

/// Pulls `message` and `component` out of an event
#[derive(Default)]
struct FieldVisitor {
    message: String,
    component: Option<String>,
}

impl tracing::field::Visit for FieldVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn fmt::Debug) {
        match field.name() {
            "message" => self.message = format!("{:?}", value),
            "component" => self.component = Some(format!("{:?}", value).trim_matches('"').to_string()),
            _ => {}
        }
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        match field.name() {
            "message" => self.message = value.to_string(),
            "component" => self.component = Some(value.to_string()),
            _ => {}
        }
    }
}

fn is_terminal() -> bool {
    if std::env::var("TERM").unwrap_or_default() == "dumb" {
        return false;
    }
    std::io::stdout().is_terminal()
}
