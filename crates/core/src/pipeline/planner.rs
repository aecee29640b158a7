//! Trading-calendar-aware download planning.
//!
//! For one instrument and one requested window, the planner computes the
//! exact trading days that need fetching and groups them into date chunks
//! sized for one provider call each. It deliberately does **not** subtract
//! already-stored dates — that pruning is an orchestrator policy applied
//! on incremental runs.

use std::sync::Arc;

use chrono::NaiveDate;

use quotehub_market_data::{Exchange, InstrumentId};

use crate::calendar::CalendarService;
use crate::errors::Result;
use crate::models::Instrument;

/// One provider-call-sized unit of work.
#[derive(Clone, Debug)]
pub struct WorkItem {
    pub instrument_id: InstrumentId,
    pub symbol: String,
    pub exchange: Exchange,
    /// Inclusive chunk bounds.
    pub first: NaiveDate,
    pub last: NaiveDate,
    /// The trading days this chunk is expected to produce.
    pub expected_days: Vec<NaiveDate>,
}

/// Calendar-aware planner.
pub struct DownloadPlanner {
    calendar: Arc<CalendarService>,
    /// 0 means one chunk spanning the whole window.
    chunk_days: i64,
}

impl DownloadPlanner {
    pub fn new(calendar: Arc<CalendarService>, chunk_days: i64) -> Self {
        Self {
            calendar,
            chunk_days,
        }
    }

    pub fn calendar(&self) -> &Arc<CalendarService> {
        &self.calendar
    }

    /// Plan the work for one instrument over `[w1, w2]`.
    ///
    /// The effective window is clipped to the instrument's listing
    /// lifetime; an empty effective window or an empty trading-day set
    /// yields no work. An unknown calendar window propagates
    /// [`Error::CalendarUnknown`](crate::Error::CalendarUnknown).
    pub async fn plan(
        &self,
        instrument: &Instrument,
        w1: NaiveDate,
        w2: NaiveDate,
    ) -> Result<Vec<WorkItem>> {
        let start = match instrument.listed_date {
            Some(listed) => w1.max(listed),
            None => w1,
        };
        let end = match instrument.delisted_date {
            Some(delisted) => w2.min(delisted),
            None => w2,
        };
        if start > end {
            return Ok(vec![]);
        }

        let trading_days = self
            .calendar
            .trading_days_in(instrument.exchange, start, end)
            .await?;
        if trading_days.is_empty() {
            return Ok(vec![]);
        }

        Ok(self.chunk(instrument, &trading_days))
    }

    /// Group sorted trading days into chunks. A new chunk starts whenever
    /// the next day is `chunk_days` or more after the chunk's first day.
    fn chunk(&self, instrument: &Instrument, trading_days: &[NaiveDate]) -> Vec<WorkItem> {
        let mut items = Vec::new();
        let mut current: Vec<NaiveDate> = Vec::new();

        for &day in trading_days {
            let split = match current.first() {
                Some(&first) => self.chunk_days > 0 && (day - first).num_days() >= self.chunk_days,
                None => false,
            };
            if split {
                items.push(self.item(instrument, std::mem::take(&mut current)));
            }
            current.push(day);
        }
        if !current.is_empty() {
            items.push(self.item(instrument, current));
        }

        items
    }

    fn item(&self, instrument: &Instrument, days: Vec<NaiveDate>) -> WorkItem {
        WorkItem {
            instrument_id: instrument.instrument_id.clone(),
            symbol: instrument.symbol.clone(),
            exchange: instrument.exchange,
            first: days[0],
            last: *days.last().expect("chunk is never empty"),
            expected_days: days,
        }
    }
}
