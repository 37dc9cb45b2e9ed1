use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{info, warn};

use crate::api::{Event, TicketId, TrackerClient, TrackerReadApi};
use crate::config::{AccessToken, TrackerSettings};
use crate::error::{Error, FetchError};
use crate::paginate::walk_pages;

/// Comment text the tracker leaves behind when a comment is removed.
pub const DELETED_MARKER: &str = "[deleted]";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TicketComment {
    pub user: String,
    pub content: String,
}

/// Ticket title to every comment posted under that title, in the order the
/// tracker returned them. Tickets that share a title share one entry.
pub type CommentMap = BTreeMap<String, Vec<TicketComment>>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectReport {
    pub comments: CommentMap,
    pub tickets: usize,
    pub ticket_pages: usize,
    pub event_pages: usize,
    pub events: usize,
    pub kept_comments: usize,
    pub deleted_comments: usize,
    pub merged_titles: usize,
    pub request_count: usize,
}

impl CollectReport {
    pub fn titles(&self) -> usize {
        self.comments.len()
    }
}

#[derive(Debug, Clone, Default)]
struct ThreadReport {
    comments: Vec<TicketComment>,
    pages: usize,
    events: usize,
    deleted: usize,
}

pub fn collect_from_tracker(
    settings: TrackerSettings,
    token: AccessToken,
) -> Result<CollectReport, Error> {
    let mut client = TrackerClient::new(settings, token)?;
    Ok(collect_comments(&mut client)?)
}

/// Fetch every ticket and its comment thread, grouped by ticket title.
///
/// One sequential pass. Any failed or malformed page aborts the whole run and
/// nothing is returned.
pub fn collect_comments<A>(api: &mut A) -> Result<CollectReport, FetchError>
where
    A: TrackerReadApi + ?Sized,
{
    let mut report = CollectReport::default();
    let mut first_ticket_by_title: BTreeMap<String, TicketId> = BTreeMap::new();

    let walk = walk_pages(
        &mut *api,
        "tickets",
        None,
        |api, cursor| api.get_tickets_page(cursor),
        |api, ticket| {
            let thread = collect_thread(api, &ticket.id)?;

            match first_ticket_by_title.get(&ticket.title) {
                Some(first) if *first != ticket.id => {
                    report.merged_titles += 1;
                    warn!(
                        title = %ticket.title,
                        first = %first,
                        ticket = %ticket.id,
                        "tickets share a title; merging their comments"
                    );
                }
                Some(_) => {}
                None => {
                    first_ticket_by_title.insert(ticket.title.clone(), ticket.id.clone());
                }
            }

            report.tickets += 1;
            report.event_pages += thread.pages;
            report.events += thread.events;
            report.deleted_comments += thread.deleted;
            report.kept_comments += thread.comments.len();
            report
                .comments
                .entry(ticket.title)
                .or_default()
                .extend(thread.comments);
            Ok(())
        },
    )?;

    report.ticket_pages = walk.pages;
    report.request_count = api.request_count();
    info!(
        tickets = report.tickets,
        titles = report.titles(),
        comments = report.kept_comments,
        deleted = report.deleted_comments,
        requests = report.request_count,
        "collected ticket comments"
    );
    Ok(report)
}

/// Walk one ticket's events and keep its live comments, in order.
fn collect_thread<A>(api: &mut A, ticket: &TicketId) -> Result<ThreadReport, FetchError>
where
    A: TrackerReadApi + ?Sized,
{
    let mut thread = ThreadReport::default();
    let resource = format!("tickets/{ticket}/events");
    let walk = walk_pages(
        &mut *api,
        &resource,
        None,
        |api, cursor| api.get_events_page(ticket, cursor),
        |_, event| {
            match comment_from_event(ticket, event)? {
                EventOutcome::Comment(comment) => thread.comments.push(comment),
                EventOutcome::Deleted => thread.deleted += 1,
                EventOutcome::Ignored => {}
            }
            Ok(())
        },
    )?;
    thread.pages = walk.pages;
    thread.events = walk.items;
    Ok(thread)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum EventOutcome {
    Comment(TicketComment),
    Deleted,
    Ignored,
}

fn comment_from_event(ticket: &TicketId, event: Event) -> Result<EventOutcome, FetchError> {
    if !event.is_comment() {
        return Ok(EventOutcome::Ignored);
    }
    let comment = match event.decode_comment() {
        Some(Ok(comment)) => comment,
        Some(Err(error)) => {
            return Err(FetchError::MalformedEvent {
                ticket: ticket.to_string(),
                detail: format!("undecodable comment payload: {error}"),
            });
        }
        None => {
            return Err(FetchError::MalformedEvent {
                ticket: ticket.to_string(),
                detail: "comment event without a comment".to_string(),
            });
        }
    };
    if is_deleted(&comment.text) {
        return Ok(EventOutcome::Deleted);
    }
    Ok(EventOutcome::Comment(TicketComment {
        user: comment.submitter.canonical_name,
        content: comment.text,
    }))
}

/// Blank here means Unicode whitespace plus the ASCII information separators
/// U+001C..=U+001F.
pub fn is_deleted(text: &str) -> bool {
    text.trim_matches(|ch: char| ch.is_whitespace() || ('\u{1c}'..='\u{1f}').contains(&ch))
        == DELETED_MARKER
}
