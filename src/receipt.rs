//! Receipt layouts: everything the device ever prints is built here

use crate::connectivity::ConnectivityTransition;
use crate::error::truncate_detail;
use crate::inference::PoemResult;
use crate::printer::{DEFAULT_LINE_HEIGHT, Justify, PrintJob};
use crate::text_wrap;
use chrono::{DateTime, Local};

const HEADER_RULE_TOP: &str = "`'. .'`'. .'`'. .'`'. .'`'. .'`";
const HEADER_RULE_BOTTOM: &str = "   `     `     `     `     `   ";
const FOOTER_RULE_TOP: &str = "   .     .     .     .     .   ";
const FOOTER_RULE_BOTTOM: &str = "_.` `._.` `._.` `._.` `._.` `._";

const DETAIL_MAX: usize = 64;

fn time_of_day(at: DateTime<Local>) -> String {
    at.format("%-I:%M %p").to_string()
}

/// Greeting printed once the printer passes its self-test
pub fn greeting() -> PrintJob {
    PrintJob::new()
        .reset()
        .justify(Justify::Center)
        .feed(1)
        .line("hello, i am")
        .line("poetry camera")
        .feed(2)
}

/// Date, time and decorative rule at the top of every receipt
pub fn header(at: DateTime<Local>) -> PrintJob {
    PrintJob::new()
        .justify(Justify::Center)
        .feed(1)
        .line(at.format("%b %-d, %Y").to_string())
        .line(time_of_day(at))
        // a spacer slightly taller than one row
        .line_height(56)
        .line("")
        .line_height(DEFAULT_LINE_HEIGHT)
        .line(HEADER_RULE_TOP)
        .line(HEADER_RULE_BOTTOM)
}

/// The poem body, wrapped to the paper width
pub fn poem(result: &PoemResult, width: usize) -> PrintJob {
    let mut job = PrintJob::new()
        .justify(Justify::Left)
        .lines(&text_wrap::wrap(&result.text, width));

    if let Some(caption) = &result.caption {
        job = job
            .feed(1)
            .justify(Justify::Center)
            .lines(&text_wrap::wrap(caption, width));
    }

    job
}

/// Decorative rule, attribution and a paper feed for tearing off
pub fn footer(attribution: &[String]) -> PrintJob {
    let job = PrintJob::new()
        .justify(Justify::Center)
        .line(FOOTER_RULE_TOP)
        .line(FOOTER_RULE_BOTTOM)
        .feed(1);

    attribution
        .iter()
        .fold(job, |job, line| job.line(line.as_str()))
        .feed(5)
}

/// Short apology with a truncated technical detail, printed in place of a poem
pub fn apology(detail: &str, width: usize) -> PrintJob {
    let detail = format!("Error: {}", truncate_detail(detail, DETAIL_MAX));
    PrintJob::new()
        .justify(Justify::Left)
        .line("Alas, something went wrong.")
        .feed(1)
        .lines(&text_wrap::wrap(&detail, width))
}

/// Notice printed when connectivity changes
pub fn connectivity_notice(
    transition: ConnectivityTransition,
    at: DateTime<Local>,
    setup_hint: &str,
) -> PrintJob {
    let job = PrintJob::new().justify(Justify::Center).feed(1);

    let job = match transition {
        ConnectivityTransition::InitiallyOnline => job.line("and i am ONLINE!"),
        ConnectivityTransition::InitiallyOffline => job
            .line("but i'm OFFLINE!")
            .line("i need internet to work!")
            .line(setup_hint),
        ConnectivityTransition::WentOffline => job
            .line(format!("{}: oh no, i lost internet!", time_of_day(at)))
            .line(setup_hint),
        ConnectivityTransition::BackOnline => {
            job.line(format!("{}: i'm back online!", time_of_day(at)))
        }
    };

    job.feed(5)
}
