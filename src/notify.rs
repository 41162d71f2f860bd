use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock};

use crate::error::BoxError;
use crate::owner::{Owner, OwnerResolver};
use crate::speed::format_speed;
use crate::violation::Violation;

/// Two independent delivery channels. Each call may fail on its own.
pub trait Notifier: Send + Sync {
    /// Mail-like channel with a subject line.
    fn send_message(&self, destination: &str, subject: &str, body: &str) -> Result<(), BoxError>;

    /// Short-message channel.
    fn send_alert(&self, destination: &str, body: &str) -> Result<(), BoxError>;
}

/// Writes notifications to the log instead of delivering them.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send_message(&self, destination: &str, subject: &str, body: &str) -> Result<(), BoxError> {
        log::info!("message to {}: {}\n{}", destination, subject, body.trim());
        Ok(())
    }

    fn send_alert(&self, destination: &str, body: &str) -> Result<(), BoxError> {
        log::info!("alert to {}: {}", destination, body);
        Ok(())
    }
}

/// Identities already notified in the current session.
#[derive(Debug, Default)]
pub struct NotifiedSet {
    ids: RwLock<HashSet<u32>>,
}

impl NotifiedSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, track_id: u32) -> bool {
        self.ids
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&track_id)
    }

    /// Returns false if the identity was already present.
    pub fn insert(&self, track_id: u32) -> bool {
        self.ids
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(track_id)
    }

    pub fn len(&self) -> usize {
        self.ids.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sorted copy of the identities.
    pub fn snapshot(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self
            .ids
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .copied()
            .collect();
        ids.sort_unstable();
        ids
    }
}

/// What a single [`NotificationDispatcher::dispatch`] call did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    NoViolation,
    AlreadyNotified,
    PlateUnresolved,
    OwnerNotFound,
    /// Both channels were tried; the identity is now in the notified set.
    Attempted { message_sent: bool, alert_sent: bool },
}

/// The bits of a violating track a notification is built from.
#[derive(Debug, Clone, Copy)]
pub struct Offence<'a> {
    pub track_id: u32,
    pub plate: Option<&'a str>,
    pub speed: f64,
    pub unit: &'a str,
    pub violation: Violation,
}

pub struct NotificationDispatcher {
    owners: Arc<dyn OwnerResolver>,
    notifier: Arc<dyn Notifier>,
}

impl NotificationDispatcher {
    pub fn new(owners: Arc<dyn OwnerResolver>, notifier: Arc<dyn Notifier>) -> Self {
        Self { owners, notifier }
    }

    /// Sends at most one notification attempt per identity and session.
    ///
    /// An identity is marked notified once both channels were attempted, even
    /// if both failed. A failed or empty owner lookup leaves it unmarked.
    pub fn dispatch(&self, offence: &Offence<'_>, notified: &NotifiedSet) -> Dispatch {
        if !offence.violation.is_violation() {
            return Dispatch::NoViolation;
        }

        if notified.contains(offence.track_id) {
            return Dispatch::AlreadyNotified;
        }

        let Some(plate) = offence.plate else {
            return Dispatch::PlateUnresolved;
        };

        let owner = match self.owners.lookup(plate) {
            Ok(Some(owner)) => owner,
            Ok(None) => return Dispatch::OwnerNotFound,
            Err(err) => {
                log::warn!("owner lookup for {} failed: {}", plate, err);
                return Dispatch::OwnerNotFound;
            }
        };

        let (subject, body) = compose_message(plate, &owner, offence);
        let message_sent = match self.notifier.send_message(&owner.email, &subject, &body) {
            Ok(()) => {
                log::info!("message sent to {} for vehicle {}", owner.email, plate);
                true
            }
            Err(err) => {
                log::warn!("message to {} for vehicle {} failed: {}", owner.email, plate, err);
                false
            }
        };

        let alert = compose_alert(plate, offence);
        let alert_sent = match self.notifier.send_alert(&owner.contact, &alert) {
            Ok(()) => {
                log::info!("alert sent to {} for vehicle {}", owner.contact, plate);
                true
            }
            Err(err) => {
                log::warn!("alert to {} for vehicle {} failed: {}", owner.contact, plate, err);
                false
            }
        };

        notified.insert(offence.track_id);

        Dispatch::Attempted {
            message_sent,
            alert_sent,
        }
    }
}

fn compose_message(plate: &str, owner: &Owner, offence: &Offence<'_>) -> (String, String) {
    let subject = format!("Traffic Violation Alert - {}", plate);
    let body = format!(
        "Violation Detected\n\n\
         Vehicle Plate: {}\n\
         Owner: {}\n\
         Contact: {}\n\
         Speed: {}\n\
         Violation: {}\n\n\
         Please take necessary action.\n",
        plate,
        owner.name,
        owner.contact,
        format_speed(offence.speed, offence.unit),
        offence.violation
    );

    (subject, body)
}

fn compose_alert(plate: &str, offence: &Offence<'_>) -> String {
    format!(
        "Your vehicle {} was detected over-speeding at {}. Please adhere to road safety rules.",
        plate,
        format_speed(offence.speed, offence.unit)
    )
}
