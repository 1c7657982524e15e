//! Groups per-recipient outbound records into logical sends.
//!
//! The gateway reports one record per recipient. A staff member sending one
//! notice to 300 parents produces 300 records with the same body; this
//! module folds them back into one [`MessageGroup`].
//!
//! The group key is the literal body text. Bodies that differ only in
//! whitespace are separate groups.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::gateway::RawMessageRecord;

/// Delivery status bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusBucket {
    Delivered,
    Failed,
    Pending,
}

impl StatusBucket {
    /// Classify a free-text gateway status. Missing or unrecognised
    /// statuses count as pending.
    pub fn classify(status: Option<&str>) -> Self {
        match status.map(str::to_lowercase).as_deref() {
            Some("delivered") => StatusBucket::Delivered,
            Some("failed") => StatusBucket::Failed,
            _ => StatusBucket::Pending,
        }
    }
}

/// Per-bucket recipient counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusTally {
    pub delivered: u32,
    pub failed: u32,
    pub pending: u32,
}

impl StatusTally {
    fn record(&mut self, bucket: StatusBucket) {
        match bucket {
            StatusBucket::Delivered => self.delivered += 1,
            StatusBucket::Failed => self.failed += 1,
            StatusBucket::Pending => self.pending += 1,
        }
    }

    pub fn total(&self) -> u32 {
        self.delivered + self.failed + self.pending
    }
}

/// One recipient of a grouped send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipient {
    pub phone_number: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    pub credit_cost: u32,
}

/// Records sharing identical body text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageGroup {
    pub message: String,
    /// Timestamp of the first record seen for this text
    pub sent_at: DateTime<Utc>,
    pub recipients: Vec<Recipient>,
    pub status: StatusTally,
    pub total_credits: u64,
}

struct Builder<'a> {
    group: MessageGroup,
    seen: HashSet<&'a str>,
}

/// Group outbound records by body text.
///
/// Groups come out in order of first appearance. Within a group the first
/// record for a phone number wins; later records for the same number are
/// dropped.
pub fn group<'a, I>(records: I) -> Vec<MessageGroup>
where
    I: IntoIterator<Item = &'a RawMessageRecord>,
{
    let mut index: HashMap<&'a str, usize> = HashMap::new();
    let mut builders: Vec<Builder<'a>> = Vec::new();

    for record in records {
        let slot = *index.entry(record.body.as_str()).or_insert_with(|| {
            builders.push(Builder {
                group: MessageGroup {
                    message: record.body.clone(),
                    sent_at: record.timestamp,
                    recipients: Vec::new(),
                    status: StatusTally::default(),
                    total_credits: 0,
                },
                seen: HashSet::new(),
            });
            builders.len() - 1
        });

        let builder = &mut builders[slot];
        if !builder.seen.insert(record.phone_number.as_str()) {
            continue;
        }

        let group = &mut builder.group;
        group
            .status
            .record(StatusBucket::classify(record.status.as_deref()));
        group.total_credits += u64::from(record.credit_cost);
        group.recipients.push(Recipient {
            phone_number: record.phone_number.clone(),
            status: record.status.clone(),
            credit_cost: record.credit_cost,
        });
    }

    builders.into_iter().map(|b| b.group).collect()
}

/// Sort groups most recent first. Stable, so ties keep input order.
pub fn sort_by_recency(groups: &mut [MessageGroup]) {
    groups.sort_by(|a, b| b.sent_at.cmp(&a.sent_at));
}
