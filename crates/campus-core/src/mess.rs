//! # Mess
//!
//! Menus per (date, meal type), with bookings and feedback held in their own
//! indexed collections. A booking is unique per (menu, student); the store's
//! composite unique index enforces it at write time.
//!
//! A menu's `booked_count`, `feedback_count` and `average_rating` are
//! refreshed from the backing collections after every booking or feedback
//! insert. `get_menu` recomputes them on read, and `reconcile_counts`
//! repairs stored values left stale by an interrupted write.

use crate::campus::Campus;
use crate::primitives::{MAX_RATING, MAX_TEXT_LENGTH, MIN_RATING};
use crate::query::{Collection, Record};
use crate::storage::schema::{MESS_BOOKINGS, MESS_FEEDBACK, MESS_MENUS};
use crate::storage::{Filter, IndexValue, Key};
use crate::{Actor, CampusError, CampusResult, Role};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

const KITCHEN: &[Role] = &[Role::MessStaff, Role::Admin];

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MealType {
    Breakfast,
    Lunch,
    Snacks,
    Dinner,
}

impl MealType {
    pub const ALL: [MealType; 4] = [Self::Breakfast, Self::Lunch, Self::Snacks, Self::Dinner];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Breakfast => "breakfast",
            Self::Lunch => "lunch",
            Self::Snacks => "snacks",
            Self::Dinner => "dinner",
        }
    }
}

impl fmt::Display for MealType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MealType {
    type Err = CampusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|meal| meal.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| CampusError::Validation(format!("unknown meal type '{}'", s)))
    }
}

/// Key of the menu for `date` and `meal`: `{date}_{meal}`.
#[must_use]
pub fn menu_id(date: NaiveDate, meal: MealType) -> String {
    format!("{}_{}", date, meal)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessMenu {
    pub id: String,
    pub date: NaiveDate,
    pub meal_type: MealType,
    pub items: Vec<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub booked_count: usize,
    #[serde(default)]
    pub average_rating: f64,
    #[serde(default)]
    pub feedback_count: usize,
    pub created_by: String,
    pub updated_at: DateTime<Utc>,
}

impl Record for MessMenu {
    const COLLECTION: &'static str = MESS_MENUS;
    const ENTITY: &'static str = "MessMenu";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessBooking {
    #[serde(default)]
    pub id: u64,
    pub menu_id: String,
    pub student_id: String,
    pub timestamp: DateTime<Utc>,
}

impl Record for MessBooking {
    const COLLECTION: &'static str = MESS_BOOKINGS;
    const ENTITY: &'static str = "MessBooking";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessFeedback {
    #[serde(default)]
    pub id: u64,
    pub menu_id: String,
    pub student_id: String,
    pub rating: u8,
    #[serde(default)]
    pub comment: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl Record for MessFeedback {
    const COLLECTION: &'static str = MESS_FEEDBACK;
    const ENTITY: &'static str = "MessFeedback";
}

/// Input for `save_menu`. Omitted counts are recomputed from the booking
/// and feedback collections.
#[derive(Debug, Clone, Deserialize)]
pub struct MenuInput {
    pub date: NaiveDate,
    pub meal_type: MealType,
    pub items: Vec<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    pub booked_count: Option<usize>,
    #[serde(default)]
    pub average_rating: Option<f64>,
    #[serde(default)]
    pub feedback_count: Option<usize>,
}

impl MenuInput {
    pub fn new(date: NaiveDate, meal_type: MealType, items: Vec<String>) -> Self {
        Self {
            date,
            meal_type,
            items,
            is_active: None,
            booked_count: None,
            average_rating: None,
            feedback_count: None,
        }
    }
}

/// A menu with its bookings and feedback; counts computed on read.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MenuView {
    pub menu: MessMenu,
    pub bookings: Vec<MessBooking>,
    pub feedback: Vec<MessFeedback>,
}

/// Mean rating rounded to one decimal; 0.0 without feedback.
#[must_use]
pub fn average_rating(feedback: &[MessFeedback]) -> f64 {
    if feedback.is_empty() {
        return 0.0;
    }
    let sum: f64 = feedback.iter().map(|f| f64::from(f.rating)).sum();
    (sum / feedback.len() as f64 * 10.0).round() / 10.0
}

#[derive(Debug, Clone, Copy)]
pub struct MessService<'c> {
    campus: &'c Campus,
}

impl Campus {
    pub fn mess(&self) -> MessService<'_> {
        MessService { campus: self }
    }
}

impl MessService<'_> {
    fn menus(&self) -> Collection<'_, MessMenu> {
        self.campus.store.collection::<MessMenu>()
    }

    fn bookings(&self) -> Collection<'_, MessBooking> {
        self.campus.store.collection::<MessBooking>()
    }

    fn feedback(&self) -> Collection<'_, MessFeedback> {
        self.campus.store.collection::<MessFeedback>()
    }

    fn require_menu(&self, date: NaiveDate, meal: MealType) -> CampusResult<MessMenu> {
        self.menus().require(menu_id(date, meal))
    }

    /// Overwrite the menu's derived fields from the backing collections.
    fn refresh_counts(&self, menu: &mut MessMenu) -> CampusResult<()> {
        menu.booked_count = self
            .bookings()
            .count_where(Filter::eq("menu_id", menu.id.as_str()))?;
        let feedback = self.feedback().find(Filter::eq("menu_id", menu.id.as_str()))?;
        menu.feedback_count = feedback.len();
        menu.average_rating = average_rating(&feedback);
        Ok(())
    }

    /// Refresh and store the derived fields. A failure leaves the counters
    /// stale for `reconcile_counts`; the primary write already succeeded.
    fn store_counts(&self, menu_key: &str) {
        let result = self.menus().require(menu_key).and_then(|mut menu| {
            self.refresh_counts(&mut menu)?;
            self.menus().put(&menu).map(|_| ())
        });
        if let Err(e) = result {
            tracing::warn!(event = "menu_counts_stale", menu_id = %menu_key, error = %e);
        }
    }

    // =========================================================================
    // MENUS
    // =========================================================================

    /// Create or replace the menu for (date, meal type).
    pub fn save_menu(&self, actor: &Actor, input: MenuInput) -> CampusResult<MessMenu> {
        actor.require_any(KITCHEN, "save_menu")?;
        let items: Vec<String> = input
            .items
            .into_iter()
            .map(|item| item.trim().to_string())
            .filter(|item| !item.is_empty())
            .collect();
        if items.is_empty() {
            return Err(CampusError::Validation("menu needs at least one item".to_string()));
        }
        if let Some(rating) = input.average_rating
            && !(0.0..=f64::from(MAX_RATING)).contains(&rating)
        {
            return Err(CampusError::Validation(format!(
                "average_rating {} out of range",
                rating
            )));
        }

        let id = menu_id(input.date, input.meal_type);
        let existing = self.menus().get(id.as_str())?;
        let mut menu = MessMenu {
            id,
            date: input.date,
            meal_type: input.meal_type,
            items,
            is_active: input
                .is_active
                .or(existing.as_ref().map(|m| m.is_active))
                .unwrap_or(true),
            booked_count: 0,
            average_rating: 0.0,
            feedback_count: 0,
            created_by: existing
                .as_ref()
                .map(|m| m.created_by.clone())
                .unwrap_or_else(|| actor.user_id().to_string()),
            updated_at: self.campus.now(),
        };
        self.refresh_counts(&mut menu)?;
        if let Some(count) = input.booked_count {
            menu.booked_count = count;
        }
        if let Some(count) = input.feedback_count {
            menu.feedback_count = count;
        }
        if let Some(rating) = input.average_rating {
            menu.average_rating = rating;
        }

        self.menus().put(&menu)?;
        self.campus.activity().record(
            actor.user_id(),
            if existing.is_some() { "menu_updated" } else { "menu_created" },
            Some(format!("menu={}", menu.id)),
        );
        Ok(menu)
    }

    /// The menu with bookings and feedback, counts computed on read.
    pub fn get_menu(&self, date: NaiveDate, meal: MealType) -> CampusResult<Option<MenuView>> {
        let Some(mut menu) = self.menus().get(menu_id(date, meal))? else {
            return Ok(None);
        };
        let bookings = self.bookings().find(Filter::eq("menu_id", menu.id.as_str()))?;
        let feedback = self.feedback().find(Filter::eq("menu_id", menu.id.as_str()))?;
        menu.booked_count = bookings.len();
        menu.feedback_count = feedback.len();
        menu.average_rating = average_rating(&feedback);
        Ok(Some(MenuView {
            menu,
            bookings,
            feedback,
        }))
    }

    /// All menus on `date`, breakfast to dinner.
    pub fn menus_for_date(&self, date: NaiveDate) -> CampusResult<Vec<MessMenu>> {
        let mut menus = self.menus().find(Filter::eq("date", date.to_string()))?;
        menus.sort_by_key(|m| m.meal_type);
        Ok(menus)
    }

    /// Delete a menu together with its bookings and feedback.
    ///
    /// Children go first and the menu last, so an interrupted delete leaves
    /// the menu in place and can simply be run again.
    pub fn delete_menu(&self, actor: &Actor, date: NaiveDate, meal: MealType) -> CampusResult<()> {
        actor.require_any(KITCHEN, "delete_menu")?;
        let id = menu_id(date, meal);
        if self.menus().get(id.as_str())?.is_none() {
            return Err(CampusError::not_found(MessMenu::ENTITY, id));
        }
        let booking_keys: Vec<Key> = self
            .bookings()
            .find(Filter::eq("menu_id", id.as_str()))?
            .iter()
            .map(|b| Key::Int(b.id))
            .collect();
        let feedback_keys: Vec<Key> = self
            .feedback()
            .find(Filter::eq("menu_id", id.as_str()))?
            .iter()
            .map(|f| Key::Int(f.id))
            .collect();
        self.campus.store.delete_many(MESS_BOOKINGS, &booking_keys)?;
        self.campus.store.delete_many(MESS_FEEDBACK, &feedback_keys)?;
        self.menus().delete(id.as_str())?;

        self.campus.activity().record(
            actor.user_id(),
            "menu_deleted",
            Some(format!(
                "menu={} bookings={} feedback={}",
                id,
                booking_keys.len(),
                feedback_keys.len()
            )),
        );
        Ok(())
    }

    // =========================================================================
    // BOOKINGS
    // =========================================================================

    /// Book (date, meal) for `student_id`.
    pub fn book_meal(
        &self,
        actor: &Actor,
        date: NaiveDate,
        meal: MealType,
        student_id: &str,
    ) -> CampusResult<MessBooking> {
        actor.require_self_or(student_id, KITCHEN, "book_meal")?;
        let menu = self.require_menu(date, meal)?;
        if !menu.is_active {
            return Err(CampusError::Inactive(format!("menu {}", menu.id)));
        }

        let duplicate = || CampusError::DuplicateBooking {
            menu_id: menu.id.clone(),
            student_id: student_id.to_string(),
        };
        let pair = Filter::eq(
            "menu_student",
            IndexValue::tuple([menu.id.as_str(), student_id]),
        );
        if self.bookings().count_where(pair)? > 0 {
            return Err(duplicate());
        }

        let booking = MessBooking {
            id: 0,
            menu_id: menu.id.clone(),
            student_id: student_id.to_string(),
            timestamp: self.campus.now(),
        };
        let booking = self.bookings().save(&booking).map_err(|e| {
            if e.is_unique_violation_on("menu_student") {
                duplicate()
            } else {
                e
            }
        })?;
        self.store_counts(&menu.id);

        self.campus.activity().record(
            actor.user_id(),
            "meal_booked",
            Some(format!("menu={} student={}", menu.id, student_id)),
        );
        Ok(booking)
    }

    /// Remove a booking. `NotFound` when the student holds none.
    pub fn cancel_booking(
        &self,
        actor: &Actor,
        date: NaiveDate,
        meal: MealType,
        student_id: &str,
    ) -> CampusResult<()> {
        actor.require_self_or(student_id, KITCHEN, "cancel_booking")?;
        let id = menu_id(date, meal);
        let booking = self
            .bookings()
            .find_one(Filter::eq(
                "menu_student",
                IndexValue::tuple([id.as_str(), student_id]),
            ))?
            .ok_or_else(|| {
                CampusError::not_found(MessBooking::ENTITY, format!("{}/{}", id, student_id))
            })?;
        self.bookings().delete(booking.id)?;
        self.store_counts(&id);

        self.campus.activity().record(
            actor.user_id(),
            "booking_cancelled",
            Some(format!("menu={} student={}", id, student_id)),
        );
        Ok(())
    }

    /// A student's bookings, oldest first.
    pub fn bookings_for_student(
        &self,
        actor: &Actor,
        student_id: &str,
    ) -> CampusResult<Vec<MessBooking>> {
        actor.require_self_or(student_id, KITCHEN, "bookings_for_student")?;
        self.bookings().find(Filter::eq("student_id", student_id))
    }

    // =========================================================================
    // FEEDBACK
    // =========================================================================

    /// Append feedback and refresh the menu's average. Returns the menu with
    /// the new average.
    pub fn submit_feedback(
        &self,
        actor: &Actor,
        date: NaiveDate,
        meal: MealType,
        student_id: &str,
        rating: u8,
        comment: Option<String>,
    ) -> CampusResult<MessMenu> {
        actor.require_self_or(student_id, &[Role::Admin], "submit_feedback")?;
        if !(MIN_RATING..=MAX_RATING).contains(&rating) {
            return Err(CampusError::Validation(format!(
                "rating must be between {} and {}, got {}",
                MIN_RATING, MAX_RATING, rating
            )));
        }
        let comment = comment
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());
        if comment.as_ref().is_some_and(|c| c.len() > MAX_TEXT_LENGTH) {
            return Err(CampusError::Validation("comment too long".to_string()));
        }
        let menu = self.require_menu(date, meal)?;

        self.feedback().save(&MessFeedback {
            id: 0,
            menu_id: menu.id.clone(),
            student_id: student_id.to_string(),
            rating,
            comment,
            timestamp: self.campus.now(),
        })?;
        self.store_counts(&menu.id);

        self.campus.activity().record(
            actor.user_id(),
            "feedback_submitted",
            Some(format!("menu={} rating={}", menu.id, rating)),
        );
        self.menus().require(menu.id)
    }

    // =========================================================================
    // MAINTENANCE
    // =========================================================================

    /// Rewrite every menu whose stored counts disagree with its bookings and
    /// feedback. Returns how many menus were corrected.
    pub fn reconcile_counts(&self) -> CampusResult<usize> {
        let mut corrected = 0;
        for menu in self.menus().all()? {
            let mut fresh = menu.clone();
            self.refresh_counts(&mut fresh)?;
            if fresh != menu {
                self.menus().put(&fresh)?;
                tracing::info!(
                    event = "menu_counts_reconciled",
                    menu_id = %menu.id,
                    booked = fresh.booked_count,
                    was = menu.booked_count
                );
                corrected += 1;
            }
        }
        Ok(corrected)
    }

    pub(crate) fn booking_count_for(&self, student_id: &str) -> CampusResult<usize> {
        self.bookings().count_where(Filter::eq("student_id", student_id))
    }

    pub(crate) fn feedback_count_for(&self, student_id: &str) -> CampusResult<usize> {
        self.feedback().count_where(Filter::eq("student_id", student_id))
    }
}

// =============================================================================
// TESTS
// =============================================================================
