//! Slice paging state for browsing a patient's images.
//!
//! # Design
//! - `select` bumps a generation counter and hands out a [`FetchTicket`];
//!   `complete` applies a fetch result only while its ticket is current, so a
//!   slow response for a previous patient never overwrites a newer view.
//! - The slice index is always clamped to `[0, N-1]`, where N is the length of
//!   the shortest non-empty category.

use dosecast_api_models::ArtifactListing;

/// Where the navigator is in its fetch cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewState {
    /// No patient selected yet.
    Idle,
    /// Waiting for the listing of `patient`.
    Loading {
        /// Patient being fetched.
        patient: String,
    },
    /// Listing loaded; `index` is the slice on screen.
    Ready {
        /// Patient on screen.
        patient: String,
        /// Image URLs per category.
        listing: ArtifactListing,
        /// Current slice, clamped to the listing.
        index: usize,
    },
    /// The fetch failed or returned no images.
    Failed {
        /// Patient whose fetch failed.
        patient: String,
        /// Reason shown to the user.
        message: String,
    },
}

/// Proof of which selection a fetch belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    generation: u64,
    patient: String,
}

impl FetchTicket {
    /// Patient the fetch was issued for.
    #[must_use]
    pub fn patient(&self) -> &str {
        &self.patient
    }

    /// Monotonic generation assigned at selection time.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }
}

/// URLs for one slice position. A category shorter than the index is `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SliceView<'a> {
    /// Zero-based slice index.
    pub index: usize,
    /// Number of navigable slices.
    pub count: usize,
    /// CT image URL.
    pub ct: Option<&'a str>,
    /// Reference dose image URL.
    pub dose: Option<&'a str>,
    /// Predicted dose image URL.
    pub prediction: Option<&'a str>,
}

/// Client-side state machine: `Idle → Loading → {Ready, Failed}`.
#[derive(Debug, Clone)]
pub struct SliceNavigator {
    generation: u64,
    state: ViewState,
}

impl Default for SliceNavigator {
    fn default() -> Self {
        Self::new()
    }
}

impl SliceNavigator {
    /// Navigator with nothing selected.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            generation: 0,
            state: ViewState::Idle,
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> &ViewState {
        &self.state
    }

    /// Switch to `patient`, discarding whatever was loaded or in flight.
    pub fn select(&mut self, patient: impl Into<String>) -> FetchTicket {
        let patient = patient.into();
        self.generation += 1;
        self.state = ViewState::Loading {
            patient: patient.clone(),
        };
        FetchTicket {
            generation: self.generation,
            patient,
        }
    }

    /// `true` while no later `select` has superseded `ticket`.
    #[must_use]
    pub fn is_current(&self, ticket: &FetchTicket) -> bool {
        ticket.generation == self.generation
            && matches!(&self.state, ViewState::Loading { patient } if *patient == ticket.patient)
    }

    /// Apply a finished fetch. Returns `false` and leaves the state untouched
    /// when the ticket is stale.
    pub fn complete(
        &mut self,
        ticket: &FetchTicket,
        result: Result<ArtifactListing, String>,
    ) -> bool {
        if !self.is_current(ticket) {
            return false;
        }
        let patient = ticket.patient.clone();
        self.state = match result {
            Ok(listing) if listing.slice_count() > 0 => ViewState::Ready {
                patient,
                listing,
                index: 0,
            },
            Ok(_) => ViewState::Failed {
                patient,
                message: "no images available".to_string(),
            },
            Err(message) => ViewState::Failed { patient, message },
        };
        true
    }

    /// Number of navigable slices; zero unless `Ready`.
    #[must_use]
    pub fn slice_count(&self) -> usize {
        match &self.state {
            ViewState::Ready { listing, .. } => listing.slice_count(),
            _ => 0,
        }
    }

    /// Current slice index when `Ready`.
    #[must_use]
    pub const fn current_index(&self) -> Option<usize> {
        match &self.state {
            ViewState::Ready { index, .. } => Some(*index),
            _ => None,
        }
    }

    /// Jump to `target`, clamped into range. `None` unless `Ready`.
    pub fn seek(&mut self, target: i64) -> Option<usize> {
        let count = self.slice_count();
        let ViewState::Ready { index, .. } = &mut self.state else {
            return None;
        };
        *index = clamp_index(target, count);
        Some(*index)
    }

    /// Move by `delta` slices, clamped into range.
    pub fn step(&mut self, delta: i64) -> Option<usize> {
        let current = self.current_index()?;
        let current = i64::try_from(current).unwrap_or(i64::MAX);
        self.seek(current.saturating_add(delta))
    }

    /// URLs at the current index.
    #[must_use]
    pub fn current_slice(&self) -> Option<SliceView<'_>> {
        let ViewState::Ready { listing, index, .. } = &self.state else {
            return None;
        };
        Some(SliceView {
            index: *index,
            count: listing.slice_count(),
            ct: url_at(&listing.ct, *index),
            dose: url_at(&listing.dose, *index),
            prediction: url_at(&listing.prediction, *index),
        })
    }
}

fn url_at(urls: &[String], index: usize) -> Option<&str> {
    urls.get(index).map(String::as_str)
}

fn clamp_index(target: i64, count: usize) -> usize {
    let Some(last) = count.checked_sub(1) else {
        return 0;
    };
    if target < 0 {
        return 0;
    }
    usize::try_from(target).map_or(last, |target| target.min(last))
}
