//! Ticket issuance: session timing and the per-session ticket batch.
//!
//! Issuance is split in two so callers can persist the session row between
//! the steps: [`TicketIssuer::prepare`] is pure and validates the template
//! before anything is written, [`TicketIssuer::commit`] writes the batch.

use std::collections::HashSet;

use rand::Rng;
use serde::Serialize;
use tracing::{error, info};
use uuid::Uuid;

use crate::authority::TicketAuthority;
use crate::clock::{ClockTime, MINUTES_PER_DAY};
use crate::codegen::CodeGenerator;
use crate::error::{Error, Result};
use crate::models::{NewSession, Session, Template, Ticket, TicketAllocation, TicketStatus};

/// Upper bound on one session's batch.
pub const MAX_TICKETS_PER_SESSION: usize = 100_000;

/// Length of a session in minutes, when the template defines one.
///
/// Time-allotted templates span all their slots; numeric templates span
/// their default start and end times. Non-positive spans yield `None`.
pub fn session_duration(template: &Template) -> Option<u32> {
    let minutes = match template.allocation {
        TicketAllocation::TimeAllotted {
            slot_duration,
            total_slots,
            ..
        } => i64::from(slot_duration) * i64::from(total_slots),
        TicketAllocation::Numeric { .. } => match (template.start_time, template.end_time) {
            (Some(start), Some(end)) => i64::from(end.minutes()) - i64::from(start.minutes()),
            _ => 0,
        },
    };

    if minutes > 0 {
        u32::try_from(minutes).ok()
    } else {
        None
    }
}

/// End time of a session starting at `start`. Falls back to the template's
/// own end time when no duration can be derived.
pub fn derive_end_time(template: &Template, start: ClockTime) -> Option<ClockTime> {
    match session_duration(template) {
        Some(duration) => Some(start.add_minutes(duration)),
        None => template.end_time,
    }
}

/// Builds the session record for `new`, with a fresh id and derived end time.
pub fn schedule_session(template: &Template, new: NewSession) -> Session {
    Session {
        id: Uuid::new_v4(),
        template_id: template.id,
        session_date: new.session_date,
        end_time: derive_end_time(template, new.start_time),
        start_time: new.start_time,
        status: new.status,
    }
}

/// Generates every ticket for `session`. Codes are unique within the batch.
pub fn plan_batch<R: Rng>(
    template: &Template,
    session: &Session,
    generator: &mut CodeGenerator<R>,
) -> Result<Vec<Ticket>> {
    let count = template.allocation.ticket_count()?;
    if count > MAX_TICKETS_PER_SESSION {
        return Err(Error::InvalidTemplateConfig(format!(
            "{} tickets per session exceeds the limit of {}",
            count, MAX_TICKETS_PER_SESSION
        )));
    }

    let user_data = template.initial_user_data();
    let mut codes = HashSet::with_capacity(count);
    let mut tickets = Vec::with_capacity(count);
    let mut emit = |assigned_value: String| {
        tickets.push(Ticket {
            id: Uuid::new_v4(),
            session_id: session.id,
            template_id: template.id,
            qr_code: generator.generate(&mut codes),
            assigned_value,
            user_data: user_data.clone(),
            status: TicketStatus::Generated,
            last_scan_timestamp: None,
        });
    };

    match template.allocation {
        TicketAllocation::Numeric { capacity } => {
            for number in 1..=capacity {
                emit(number.to_string());
            }
        }
        TicketAllocation::TimeAllotted {
            slot_duration,
            total_slots,
            capacity_per_slot,
        } => {
            for slot in 0..total_slots {
                let offset = u64::from(slot) * u64::from(slot_duration) % u64::from(MINUTES_PER_DAY);
                let slot_start = session.start_time.add_minutes(offset as u32).to_string();
                for _ in 0..capacity_per_slot {
                    emit(slot_start.clone());
                }
            }
        }
    }

    Ok(tickets)
}

/// A scheduled session and its batch, not yet persisted.
#[derive(Debug, Clone)]
pub struct PreparedIssue {
    pub session: Session,
    pub tickets: Vec<Ticket>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IssuedSession {
    pub session: Session,
    pub ticket_count: usize,
}

pub struct TicketIssuer<A> {
    authority: A,
}

impl<A: TicketAuthority> TicketIssuer<A> {
    pub fn new(authority: A) -> Self {
        Self { authority }
    }

    pub fn prepare(&self, template: &Template, new: NewSession) -> Result<PreparedIssue> {
        let session = schedule_session(template, new);
        let tickets = plan_batch(template, &session, &mut CodeGenerator::new())?;
        Ok(PreparedIssue { session, tickets })
    }

    /// Writes the batch in one call. The session must already be stored;
    /// on failure it is left in place and reported as
    /// [`Error::TicketGenerationFailed`].
    pub async fn commit(&self, prepared: PreparedIssue) -> Result<IssuedSession> {
        let PreparedIssue { session, tickets } = prepared;
        let expected = tickets.len();

        if let Err(e) = self.authority.create_tickets_bulk(&tickets).await {
            error!(
                session_id = %session.id,
                expected,
                error = %e,
                "Session stored without its tickets"
            );
            return Err(Error::TicketGenerationFailed {
                session_id: session.id,
                expected,
                reason: e.to_string(),
            });
        }

        info!(session_id = %session.id, tickets = expected, "Issued tickets");
        Ok(IssuedSession {
            session,
            ticket_count: expected,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::NaiveDate;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;
    use crate::models::{FieldDefinition, FieldType, SessionStatus};
    use crate::testing::MockAuthority;

    fn template(allocation: TicketAllocation) -> Template {
        Template {
            id: Uuid::new_v4(),
            name: "Community pantry".to_string(),
            allocation,
            start_time: None,
            end_time: None,
            required_user_fields: vec![
                FieldDefinition::new("Dietary Requirements!", FieldType::List),
                FieldDefinition::new("  --Age--  ", FieldType::Number),
            ],
        }
    }

    fn new_session(start: &str) -> NewSession {
        NewSession {
            template_id: Uuid::nil(),
            session_date: NaiveDate::from_ymd_opt(2025, 12, 24).unwrap(),
            start_time: start.parse().unwrap(),
            status: SessionStatus::Open,
        }
    }

    fn slots(slot_duration: u32, total_slots: u32, capacity_per_slot: u32) -> TicketAllocation {
        TicketAllocation::TimeAllotted {
            slot_duration,
            total_slots,
            capacity_per_slot,
        }
    }

    fn plan(template: &Template, start: &str) -> Result<Vec<Ticket>> {
        let session = schedule_session(template, new_session(start));
        plan_batch(
            template,
            &session,
            &mut CodeGenerator::with_rng(StdRng::seed_from_u64(1)),
        )
    }

    #[test]
    fn test_numeric_batch_is_numbered_from_one() {
        let t = template(TicketAllocation::Numeric { capacity: 3 });
        let tickets = plan(&t, "09:00").unwrap();

        let mut values: Vec<_> = tickets.iter().map(|t| t.assigned_value.as_str()).collect();
        values.sort();
        assert_eq!(values, ["1", "2", "3"]);

        let codes: HashSet<_> = tickets.iter().map(|t| &t.qr_code).collect();
        assert_eq!(codes.len(), 3);
    }

    #[test]
    fn test_time_allotted_batch_repeats_each_slot() {
        let t = template(slots(30, 2, 2));
        let tickets = plan(&t, "09:00").unwrap();
        assert_eq!(tickets.len(), 4);

        let mut per_slot: HashMap<&str, usize> = HashMap::new();
        for ticket in &tickets {
            *per_slot.entry(ticket.assigned_value.as_str()).or_default() += 1;
        }
        assert_eq!(per_slot.len(), 2);
        assert_eq!(per_slot["09:00"], 2);
        assert_eq!(per_slot["09:30"], 2);
    }

    #[test]
    fn test_slots_wrap_past_midnight() {
        let t = template(slots(60, 3, 1));
        let values: Vec<_> = plan(&t, "23:00")
            .unwrap()
            .into_iter()
            .map(|t| t.assigned_value)
            .collect();
        assert_eq!(values, ["23:00", "00:00", "01:00"]);
    }

    #[test]
    fn test_every_ticket_starts_unredeemed_with_null_fields() {
        let t = template(TicketAllocation::Numeric { capacity: 2 });
        for ticket in plan(&t, "09:00").unwrap() {
            assert_eq!(ticket.status, TicketStatus::Generated);
            assert!(ticket.last_scan_timestamp.is_none());
            assert_eq!(ticket.template_id, t.id);
            assert_eq!(ticket.user_data.len(), 2);
            assert!(ticket.user_data["dietary_requirements"].is_null());
            assert!(ticket.user_data["age"].is_null());
        }
    }

    #[test]
    fn test_empty_allocations_are_rejected() {
        for allocation in [
            TicketAllocation::Numeric { capacity: 0 },
            slots(0, 2, 2),
            slots(30, 0, 2),
            slots(30, 2, 0),
        ] {
            let result = plan(&template(allocation), "09:00");
            assert!(matches!(result, Err(Error::InvalidTemplateConfig(_))));
        }
    }

    #[test]
    fn test_oversized_batch_is_rejected() {
        let t = template(TicketAllocation::Numeric {
            capacity: MAX_TICKETS_PER_SESSION as u32 + 1,
        });
        assert!(matches!(
            plan(&t, "09:00"),
            Err(Error::InvalidTemplateConfig(_))
        ));
    }

    #[test]
    fn test_end_time_spans_all_slots() {
        let t = template(slots(30, 2, 2));
        let end = derive_end_time(&t, "09:00".parse().unwrap()).unwrap();
        assert_eq!(end.to_string(), "10:00");
    }

    #[test]
    fn test_end_time_uses_numeric_template_bounds() {
        let mut t = template(TicketAllocation::Numeric { capacity: 10 });
        t.start_time = Some("10:00".parse().unwrap());
        t.end_time = Some("12:30".parse().unwrap());
        let end = derive_end_time(&t, "13:00".parse().unwrap()).unwrap();
        assert_eq!(end.to_string(), "15:30");
    }

    #[test]
    fn test_end_time_wraps_within_the_day() {
        let mut t = template(TicketAllocation::Numeric { capacity: 10 });
        t.start_time = Some("08:00".parse().unwrap());
        t.end_time = Some("10:00".parse().unwrap());
        let end = derive_end_time(&t, "23:00".parse().unwrap()).unwrap();
        assert_eq!(end.to_string(), "01:00");
    }

    #[test]
    fn test_end_time_falls_back_to_template_end() {
        let mut t = template(TicketAllocation::Numeric { capacity: 10 });
        t.start_time = Some("12:00".parse().unwrap());
        t.end_time = Some("11:00".parse().unwrap());
        let end = derive_end_time(&t, "09:00".parse().unwrap());
        assert_eq!(end.map(|e| e.to_string()).as_deref(), Some("11:00"));

        t.start_time = None;
        t.end_time = None;
        assert!(derive_end_time(&t, "09:00".parse().unwrap()).is_none());
    }

    #[test]
    fn test_schedule_session_copies_input() {
        let t = template(slots(15, 4, 1));
        let session = schedule_session(&t, new_session("08:45"));
        assert_eq!(session.template_id, t.id);
        assert_eq!(session.status, SessionStatus::Open);
        assert_eq!(session.end_time.unwrap().to_string(), "09:45");
    }

    #[tokio::test]
    async fn test_commit_writes_whole_batch() {
        let authority = MockAuthority::default();
        let issuer = TicketIssuer::new(&authority);
        let t = template(TicketAllocation::Numeric { capacity: 5 });

        let prepared = issuer.prepare(&t, new_session("09:00")).unwrap();
        let session_id = prepared.session.id;
        let issued = issuer.commit(prepared).await.unwrap();

        assert_eq!(issued.ticket_count, 5);
        assert_eq!(authority.tickets_for(session_id).len(), 5);
    }

    #[tokio::test]
    async fn test_failed_bulk_write_reports_orphaned_session() {
        let authority = MockAuthority::default();
        authority.fail_bulk_create();
        let issuer = TicketIssuer::new(&authority);
        let t = template(TicketAllocation::Numeric { capacity: 5 });

        let prepared = issuer.prepare(&t, new_session("09:00")).unwrap();
        let session_id = prepared.session.id;
        let err = issuer.commit(prepared).await.unwrap_err();

        match err {
            Error::TicketGenerationFailed {
                session_id: failed,
                expected,
                ..
            } => {
                assert_eq!(failed, session_id);
                assert_eq!(expected, 5);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(authority.tickets_for(session_id).is_empty());
    }
}
