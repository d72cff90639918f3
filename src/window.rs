#![forbid(unsafe_code)]

//! Decides how many listing pages must be fetched to cover a request.
//!
//! The listing is sorted newest first, so both modes walk pages in ascending
//! order and stop as soon as the request is covered. The returned entries are
//! a superset of the window; exact selection happens in the playlist builder.

use chrono::{DateTime, Duration, Utc};
use log::debug;

use crate::catalog::{Catalog, ListingEntry, PAGE_SIZE};
use crate::error::{BsmhError, Result};

/// What the caller wants out of the listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowRequest {
    /// The `n` most recent maps.
    Count(usize),
    /// Maps uploaded during the last `h` hours.
    Hours(u32),
}

pub fn resolve(
    catalog: &impl Catalog,
    request: WindowRequest,
    now: DateTime<Utc>,
) -> Result<Vec<ListingEntry>> {
    match request {
        WindowRequest::Count(count) => resolve_by_count(catalog, count),
        WindowRequest::Hours(hours) => resolve_by_hours(catalog, hours, now),
    }
}

/// Number of pages holding the `count` newest entries.
pub fn pages_for_count(count: usize) -> usize {
    count.div_ceil(PAGE_SIZE)
}

/// `now - hours`, or a configuration error when that instant is outside the
/// representable calendar.
pub fn cutoff_for(hours: u32, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    Duration::try_hours(i64::from(hours))
        .and_then(|window| now.checked_sub_signed(window))
        .ok_or_else(|| BsmhError::Config(format!("a {hours}h window reaches past the calendar")))
}

/// Fetches `ceil(count / 10)` pages. May return more than `count` entries.
pub fn resolve_by_count(catalog: &impl Catalog, count: usize) -> Result<Vec<ListingEntry>> {
    let pages = pages_for_count(count);
    println!("We must fetch {pages} page(s)");

    let mut entries = Vec::new();
    for index in 0..pages {
        println!("Getting page {}", index + 1);
        let page = catalog.fetch_page(index)?;
        let last = page.is_last();
        entries.extend(page.entries);
        if last {
            debug!("listing exhausted at page {index}");
            break;
        }
    }
    Ok(entries)
}

/// Fetches pages until the oldest entry seen is no newer than
/// `now - hours`. An empty result means nothing was uploaded in the window.
pub fn resolve_by_hours(
    catalog: &impl Catalog,
    hours: u32,
    now: DateTime<Utc>,
) -> Result<Vec<ListingEntry>> {
    let cutoff = cutoff_for(hours, now)?;
    debug!("time window cutoff: {cutoff}");

    let first = catalog.fetch_page(0)?;
    let Some(newest) = first.entries.first() else {
        return Ok(Vec::new());
    };
    if newest.uploaded_at < cutoff {
        println!("No new maps in the last {hours}h, sorry.");
        return Ok(Vec::new());
    }

    let mut exhausted = first.is_last();
    let mut entries = first.entries;
    let mut index = 1;
    while !exhausted && oldest_after(&entries, cutoff) {
        if index == 1 {
            println!("We must fetch more pages");
        }
        println!("Getting page {}", index + 1);
        let page = catalog.fetch_page(index)?;
        exhausted = page.is_last();
        entries.extend(page.entries);
        index += 1;
    }
    if exhausted {
        debug!("listing exhausted after {index} page(s)");
    }
    Ok(entries)
}

fn oldest_after(entries: &[ListingEntry], cutoff: DateTime<Utc>) -> bool {
    entries
        .last()
        .is_some_and(|oldest| oldest.uploaded_at > cutoff)
}
