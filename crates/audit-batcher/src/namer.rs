// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Time-derived object keys for batches.
//!
//! Keys look like `<root>/<yyyy>/<mm>/<dd>/<hh>/<mmss.micros>.log`, e.g.
//! `vault/audit/2024/03/09/17/0412.000123.log`, always in UTC.

use chrono::{DateTime, Duration, DurationRound, Utc};
use tracing::debug;

pub const DEFAULT_KEY_ROOT: &str = "vault/audit";

const KEY_TIME_FORMAT: &str = "%Y/%m/%d/%H/%M%S.%6f";

/// Source of wall-clock time for naming.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Generates batch names from the clock at batch creation.
///
/// Names from one namer are strictly increasing: when the clock has not moved
/// past the previous name's microsecond, the previous timestamp plus one
/// microsecond is used instead.
#[derive(Debug)]
pub struct BatchNamer<C = SystemClock> {
    root: String,
    clock: C,
    last: Option<DateTime<Utc>>,
}

impl BatchNamer<SystemClock> {
    #[must_use]
    pub fn new(root: &str) -> Self {
        Self::with_clock(root, SystemClock)
    }
}

impl<C: Clock> BatchNamer<C> {
    #[must_use]
    pub fn with_clock(root: &str, clock: C) -> Self {
        BatchNamer {
            root: root.trim_end_matches('/').to_string(),
            clock,
            last: None,
        }
    }

    pub fn next_name(&mut self) -> String {
        let now = self.clock.now();
        let now = now
            .duration_trunc(Duration::microseconds(1))
            .unwrap_or(now);

        let ts = match self.last {
            Some(last) if now <= last => {
                debug!("clock did not advance past {last}, bumping batch timestamp");
                last + Duration::microseconds(1)
            }
            _ => now,
        };
        self.last = Some(ts);

        format_key(&self.root, ts)
    }
}

fn format_key(root: &str, ts: DateTime<Utc>) -> String {
    let stamp = ts.format(KEY_TIME_FORMAT);
    if root.is_empty() {
        format!("{stamp}.log")
    } else {
        format!("{root}/{stamp}.log")
    }
}
