//! Domain types for lottery bets
//!
//! A `Bet` is immutable once decoded from the wire; the store never updates
//! or deletes records after append.

use serde::{Deserialize, Serialize};

/// A single lottery bet submitted by an agency
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bet {
    /// Agency that submitted the bet
    pub agency: u8,
    pub first_name: String,
    pub last_name: String,
    /// National document number of the bettor
    pub document: u32,
    /// Fixed 10-byte textual date (e.g. "1999-03-17"); opaque to the core,
    /// no calendar validation is performed
    pub birthdate: String,
    /// The number the bettor played
    pub number: u16,
}

impl Bet {
    /// Winning predicate: a bet wins when the last two decimal digits of the
    /// played number match the last two digits of the bettor's document.
    ///
    /// Pure and deterministic, so every admitted session can recompute the
    /// draw independently without coordination.
    pub fn is_winner(&self) -> bool {
        u32::from(self.number) % 100 == self.document % 100
    }
}

/// An ordered group of bets from a single agency
///
/// A batch with zero bets is the completion sentinel ("this agency has
/// finished submitting"), not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub agency: u8,
    pub bets: Vec<Bet>,
}

impl Batch {
    pub fn new(agency: u8, bets: Vec<Bet>) -> Self {
        Self { agency, bets }
    }

    /// The empty batch an agency sends to signal completion
    pub fn finished(agency: u8) -> Self {
        Self {
            agency,
            bets: Vec::new(),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.bets.is_empty()
    }
}
