//! Process-local implementation of every repository trait.
//!
//! All state sits behind one async mutex, so each operation is atomic with
//! respect to every other. Relational rules the Postgres schema enforces
//! (uniqueness, foreign keys, cascades) are mirrored by hand.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tokio::sync::Mutex;
use tourbook_core::account::{
    NewUser, NewVendor, PasswordResetToken, Role, User, UserFilter, UserUpdate, Vendor, VendorFilter,
    VendorProfile,
};
use tourbook_core::availability::{AvailabilityFilter, AvailabilitySlot, NewSlot, SlotUpdate};
use tourbook_core::booking::{
    Booking, BookingChanges, BookingFilter, BookingStatus, NewBooking, NewTraveler, Traveler,
};
use tourbook_core::catalog::{Category, NewCategory, NewTour, Tour, TourFilter};
use tourbook_core::payment::{self, NewPayment, Payment, PaymentFilter, PaymentUpdate};
use tourbook_core::repository::{
    AvailabilityRepository, BookingRepository, CategoryRepository, PasswordResetRepository,
    PaymentRepository, TourRepository, UserRepository, VendorRepository,
};
use tourbook_core::seats;
use tourbook_core::{CoreError, CoreResult};
use tracing::{debug, info};

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[derive(Default)]
struct MemoryState {
    next_id: i64,
    users: BTreeMap<i64, User>,
    reset_tokens: HashMap<i64, PasswordResetToken>,
    vendors: BTreeMap<i64, Vendor>,
    categories: BTreeMap<i64, Category>,
    tours: BTreeMap<i64, Tour>,
    tour_categories: BTreeMap<i64, BTreeSet<i64>>,
    slots: BTreeMap<i64, AvailabilitySlot>,
    bookings: BTreeMap<i64, Booking>,
    travelers: BTreeMap<i64, Traveler>,
    payments: BTreeMap<i64, Payment>,
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

fn take_limit<T>(mut items: Vec<T>, limit: Option<i64>) -> Vec<T> {
    if let Some(limit) = limit {
        items.truncate(limit.max(0) as usize);
    }
    items
}

impl MemoryState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    // ---- read views with the joined columns filled in ----

    fn tour_view(&self, tour: &Tour) -> Tour {
        let names: BTreeSet<String> = self
            .tour_categories
            .get(&tour.id)
            .into_iter()
            .flatten()
            .filter_map(|id| self.categories.get(id).map(|c| c.name.clone()))
            .collect();
        Tour { categories: names.into_iter().collect(), ..tour.clone() }
    }

    fn vendor_view(&self, vendor: &Vendor) -> Vendor {
        let user = self.users.get(&vendor.user_id);
        Vendor {
            email: user.map(|u| u.email.clone()),
            first_name: user.map(|u| u.first_name.clone()),
            last_name: user.map(|u| u.last_name.clone()),
            phone: user.and_then(|u| u.phone.clone()),
            ..vendor.clone()
        }
    }

    fn slot_view(&self, slot: &AvailabilitySlot) -> AvailabilitySlot {
        AvailabilitySlot {
            tour_name: self.tours.get(&slot.tour_id).map(|t| t.summary.clone()),
            ..slot.clone()
        }
    }

    fn booking_view(&self, booking: &Booking) -> Booking {
        let slot = self.slots.get(&booking.availability_id);
        Booking {
            tour_name: self.tours.get(&booking.tour_id).map(|t| t.summary.clone()),
            user_email: booking
                .user_id
                .and_then(|id| self.users.get(&id))
                .map(|u| u.email.clone()),
            tour_date: slot.map(|s| s.date),
            tour_time: slot.map(|s| s.start_time),
            ..booking.clone()
        }
    }

    fn payment_view(&self, p: &Payment) -> Payment {
        let booking = self.bookings.get(&p.booking_id);
        Payment {
            booking_number: booking.map(|b| b.booking_number.clone()),
            user_email: booking
                .and_then(|b| b.user_id)
                .and_then(|id| self.users.get(&id))
                .map(|u| u.email.clone()),
            tour_name: booking
                .and_then(|b| self.tours.get(&b.tour_id))
                .map(|t| t.summary.clone()),
            ..p.clone()
        }
    }

    // ---- integrity checks mirroring the schema ----

    fn check_categories(&self, ids: &[i64]) -> CoreResult<()> {
        match ids.iter().find(|id| !self.categories.contains_key(id)) {
            Some(id) => Err(CoreError::Conflict(format!("category {} does not exist", id))),
            None => Ok(()),
        }
    }

    fn check_vendor(&self, vendor_id: Option<i64>) -> CoreResult<()> {
        match vendor_id {
            Some(id) if !self.vendors.contains_key(&id) => {
                Err(CoreError::Conflict(format!("vendor {} does not exist", id)))
            }
            _ => Ok(()),
        }
    }

    fn email_taken(&self, email: &str, except: Option<i64>) -> bool {
        self.users
            .values()
            .any(|u| Some(u.id) != except && u.email.eq_ignore_ascii_case(email))
    }

    fn slot(&self, id: i64) -> CoreResult<&AvailabilitySlot> {
        self.slots
            .get(&id)
            .ok_or_else(|| CoreError::NotFound(format!("Availability {}", id)))
    }

    fn booking(&self, id: i64) -> CoreResult<&Booking> {
        self.bookings
            .get(&id)
            .ok_or_else(|| CoreError::NotFound(format!("Booking {}", id)))
    }

    fn set_spots_booked(&mut self, slot_id: i64, spots_booked: i32) {
        if let Some(slot) = self.slots.get_mut(&slot_id) {
            slot.spots_booked = spots_booked;
            slot.updated_at = Utc::now();
        }
    }

    fn apply_booking_changes(&mut self, id: i64, changes: &BookingChanges) -> CoreResult<Booking> {
        let existing = self.booking(id)?.clone();
        let slot = self.slot(existing.availability_id)?.clone();
        let plan = seats::plan_update(&existing, &slot, changes)?;

        if plan.seat_delta != 0 {
            self.set_spots_booked(slot.id, plan.spots_booked);
            debug!(
                booking_id = id,
                slot_id = slot.id,
                delta = plan.seat_delta,
                spots_booked = plan.spots_booked,
                "Moved seats"
            );
        }

        let booking = self
            .bookings
            .get_mut(&id)
            .ok_or_else(|| CoreError::NotFound(format!("Booking {}", id)))?;
        booking.adults = plan.adults;
        booking.children = plan.children;
        booking.total_price = plan.total_price;
        booking.special_requests = plan.special_requests;
        booking.status = plan.status;
        booking.payment_status = plan.payment_status;
        booking.payment_intent_id = plan.payment_intent_id;
        booking.updated_at = Utc::now();
        let updated = booking.clone();
        Ok(self.booking_view(&updated))
    }

    fn sync_booking_with_payment(
        &mut self,
        booking_id: i64,
        event: payment::PaymentEvent,
        state: payment::PaymentState,
        payment_intent_id: Option<&str>,
    ) -> CoreResult<()> {
        let booking = self.booking(booking_id)?.clone();
        if let Some(changes) = payment::booking_effect(event, state, &booking, payment_intent_id) {
            self.apply_booking_changes(booking_id, &changes)?;
        }
        Ok(())
    }

    fn insert_traveler(&mut self, booking_id: i64, traveler: &NewTraveler) -> Traveler {
        let id = self.next_id();
        let created = Traveler {
            id,
            booking_id,
            first_name: traveler.first_name.clone(),
            last_name: traveler.last_name.clone(),
            email: traveler.email.clone(),
            phone: traveler.phone.clone(),
            is_lead: traveler.is_lead,
            traveler_type: traveler.traveler_type,
            created_at: Utc::now(),
        };
        self.travelers.insert(id, created.clone());
        created
    }
}

#[async_trait]
impl TourRepository for MemoryStore {
    async fn list_tours(&self, filter: &TourFilter) -> CoreResult<Vec<Tour>> {
        let state = self.state.lock().await;
        let mut tours: Vec<Tour> = state
            .tours
            .values()
            .map(|t| state.tour_view(t))
            .filter(|t| {
                filter
                    .category
                    .as_deref()
                    .map_or(true, |c| t.categories.iter().any(|name| contains_ci(name, c)))
            })
            .filter(|t| {
                filter.search.as_deref().map_or(true, |s| {
                    contains_ci(&t.summary, s) || contains_ci(&t.description, s)
                })
            })
            .filter(|t| filter.vendor_id.map_or(true, |v| t.vendor_id == Some(v)))
            .collect();
        tours.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        Ok(take_limit(tours, filter.limit))
    }

    async fn get_tour(&self, id: i64) -> CoreResult<Option<Tour>> {
        let state = self.state.lock().await;
        Ok(state.tours.get(&id).map(|t| state.tour_view(t)))
    }

    async fn create_tour(&self, tour: &NewTour) -> CoreResult<Tour> {
        let mut state = self.state.lock().await;
        state.check_vendor(tour.vendor_id)?;
        state.check_categories(&tour.category_ids)?;

        let id = state.next_id();
        let now = Utc::now();
        let created = Tour {
            id,
            vendor_id: tour.vendor_id,
            summary: tour.summary.clone(),
            description: tour.description.clone(),
            activity_type: tour.activity_type.clone(),
            activity_type_label: tour.activity_type_label.clone(),
            is_online: tour.is_online,
            booked_in_24_hours: tour.booked_in_24_hours,
            is_reserve_now_pay_later: tour.is_reserve_now_pay_later,
            categories: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        state.tours.insert(id, created.clone());
        state
            .tour_categories
            .insert(id, tour.category_ids.iter().copied().collect());
        Ok(state.tour_view(&created))
    }

    async fn update_tour(&self, id: i64, tour: &NewTour) -> CoreResult<Tour> {
        let mut state = self.state.lock().await;
        if !state.tours.contains_key(&id) {
            return Err(CoreError::NotFound(format!("Tour {}", id)));
        }
        state.check_vendor(tour.vendor_id)?;
        state.check_categories(&tour.category_ids)?;

        state
            .tour_categories
            .insert(id, tour.category_ids.iter().copied().collect());
        let existing = state
            .tours
            .get_mut(&id)
            .ok_or_else(|| CoreError::NotFound(format!("Tour {}", id)))?;
        existing.vendor_id = tour.vendor_id;
        existing.summary = tour.summary.clone();
        existing.description = tour.description.clone();
        existing.activity_type = tour.activity_type.clone();
        existing.activity_type_label = tour.activity_type_label.clone();
        existing.is_online = tour.is_online;
        existing.booked_in_24_hours = tour.booked_in_24_hours;
        existing.is_reserve_now_pay_later = tour.is_reserve_now_pay_later;
        existing.updated_at = Utc::now();
        let updated = existing.clone();
        Ok(state.tour_view(&updated))
    }

    async fn delete_tour(&self, id: i64) -> CoreResult<()> {
        let mut state = self.state.lock().await;
        if !state.tours.contains_key(&id) {
            return Err(CoreError::NotFound(format!("Tour {}", id)));
        }
        if state.bookings.values().any(|b| b.tour_id == id) {
            return Err(CoreError::Conflict(format!("Tour {} has bookings", id)));
        }
        state.tours.remove(&id);
        state.tour_categories.remove(&id);
        state.slots.retain(|_, s| s.tour_id != id);
        Ok(())
    }
}

#[async_trait]
impl CategoryRepository for MemoryStore {
    async fn list_categories(&self) -> CoreResult<Vec<Category>> {
        let state = self.state.lock().await;
        let mut categories: Vec<Category> = state.categories.values().cloned().collect();
        categories.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(categories)
    }

    async fn get_category(&self, id: i64) -> CoreResult<Option<Category>> {
        Ok(self.state.lock().await.categories.get(&id).cloned())
    }

    async fn create_category(&self, category: &NewCategory) -> CoreResult<Category> {
        let mut state = self.state.lock().await;
        if state.categories.values().any(|c| c.code == category.code) {
            return Err(CoreError::Conflict(format!("category code {} already exists", category.code)));
        }
        let id = state.next_id();
        let created = Category {
            id,
            name: category.name.clone(),
            code: category.code.clone(),
            is_primary: category.is_primary,
        };
        state.categories.insert(id, created.clone());
        Ok(created)
    }

    async fn update_category(&self, id: i64, category: &NewCategory) -> CoreResult<Category> {
        let mut state = self.state.lock().await;
        if state.categories.values().any(|c| c.id != id && c.code == category.code) {
            return Err(CoreError::Conflict(format!("category code {} already exists", category.code)));
        }
        let existing = state
            .categories
            .get_mut(&id)
            .ok_or_else(|| CoreError::NotFound(format!("Category {}", id)))?;
        existing.name = category.name.clone();
        existing.code = category.code.clone();
        existing.is_primary = category.is_primary;
        Ok(existing.clone())
    }

    async fn delete_category(&self, id: i64) -> CoreResult<()> {
        let mut state = self.state.lock().await;
        if state.categories.remove(&id).is_none() {
            return Err(CoreError::NotFound(format!("Category {}", id)));
        }
        for links in state.tour_categories.values_mut() {
            links.remove(&id);
        }
        Ok(())
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn list_users(&self, filter: &UserFilter) -> CoreResult<Vec<User>> {
        let state = self.state.lock().await;
        let mut users: Vec<User> = state
            .users
            .values()
            .filter(|u| filter.role.map_or(true, |r| u.role == r))
            .filter(|u| filter.email.as_deref().map_or(true, |e| contains_ci(&u.email, e)))
            .cloned()
            .collect();
        users.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        Ok(take_limit(users, filter.limit))
    }

    async fn get_user(&self, id: i64) -> CoreResult<Option<User>> {
        Ok(self.state.lock().await.users.get(&id).cloned())
    }

    async fn get_user_by_email(&self, email: &str) -> CoreResult<Option<User>> {
        let state = self.state.lock().await;
        Ok(state
            .users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn create_user(&self, user: &NewUser) -> CoreResult<User> {
        let mut state = self.state.lock().await;
        if state.email_taken(&user.email, None) {
            return Err(CoreError::Conflict(format!("email {} already registered", user.email)));
        }
        let id = state.next_id();
        let now = Utc::now();
        let created = User {
            id,
            email: user.email.clone(),
            password_hash: user.password_hash.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            phone: user.phone.clone(),
            role: user.role,
            created_at: now,
            updated_at: now,
        };
        state.users.insert(id, created.clone());
        Ok(created)
    }

    async fn update_user(&self, id: i64, update: &UserUpdate) -> CoreResult<User> {
        let mut state = self.state.lock().await;
        if state.email_taken(&update.email, Some(id)) {
            return Err(CoreError::Conflict(format!("email {} already registered", update.email)));
        }
        let user = state
            .users
            .get_mut(&id)
            .ok_or_else(|| CoreError::NotFound(format!("User {}", id)))?;
        user.email = update.email.clone();
        user.first_name = update.first_name.clone();
        user.last_name = update.last_name.clone();
        user.phone = update.phone.clone();
        if let Some(role) = update.role {
            user.role = role;
        }
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn update_password(&self, id: i64, password_hash: &str) -> CoreResult<()> {
        let mut state = self.state.lock().await;
        let user = state
            .users
            .get_mut(&id)
            .ok_or_else(|| CoreError::NotFound(format!("User {}", id)))?;
        user.password_hash = password_hash.to_string();
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn delete_user(&self, id: i64) -> CoreResult<()> {
        let mut state = self.state.lock().await;
        if state.users.remove(&id).is_none() {
            return Err(CoreError::NotFound(format!("User {}", id)));
        }
        state.reset_tokens.remove(&id);

        let vendor_ids: Vec<i64> = state
            .vendors
            .values()
            .filter(|v| v.user_id == id)
            .map(|v| v.id)
            .collect();
        for vendor_id in vendor_ids {
            state.vendors.remove(&vendor_id);
            for tour in state.tours.values_mut().filter(|t| t.vendor_id == Some(vendor_id)) {
                tour.vendor_id = None;
            }
        }
        for booking in state.bookings.values_mut().filter(|b| b.user_id == Some(id)) {
            booking.user_id = None;
        }
        Ok(())
    }
}

#[async_trait]
impl PasswordResetRepository for MemoryStore {
    async fn upsert_reset_token(
        &self,
        user_id: i64,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> CoreResult<()> {
        let mut state = self.state.lock().await;
        if !state.users.contains_key(&user_id) {
            return Err(CoreError::Conflict(format!("user {} does not exist", user_id)));
        }
        state.reset_tokens.insert(
            user_id,
            PasswordResetToken { user_id, token: token.to_string(), expires_at },
        );
        Ok(())
    }

    async fn find_reset_token(&self, token: &str) -> CoreResult<Option<PasswordResetToken>> {
        let state = self.state.lock().await;
        Ok(state.reset_tokens.values().find(|t| t.token == token).cloned())
    }

    async fn delete_reset_token(&self, token: &str) -> CoreResult<()> {
        self.state.lock().await.reset_tokens.retain(|_, t| t.token != token);
        Ok(())
    }
}

#[async_trait]
impl VendorRepository for MemoryStore {
    async fn list_vendors(&self, filter: &VendorFilter) -> CoreResult<Vec<Vendor>> {
        let state = self.state.lock().await;
        let mut vendors: Vec<Vendor> = state
            .vendors
            .values()
            .map(|v| state.vendor_view(v))
            .filter(|v| filter.is_verified.map_or(true, |flag| v.is_verified == flag))
            .filter(|v| {
                filter.search.as_deref().map_or(true, |s| {
                    contains_ci(&v.company_name, s)
                        || v.email.as_deref().map_or(false, |e| contains_ci(e, s))
                })
            })
            .collect();
        vendors.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        Ok(take_limit(vendors, filter.limit))
    }

    async fn get_vendor(&self, id: i64) -> CoreResult<Option<Vendor>> {
        let state = self.state.lock().await;
        Ok(state.vendors.get(&id).map(|v| state.vendor_view(v)))
    }

    async fn get_vendor_by_user_id(&self, user_id: i64) -> CoreResult<Option<Vendor>> {
        let state = self.state.lock().await;
        Ok(state
            .vendors
            .values()
            .find(|v| v.user_id == user_id)
            .map(|v| state.vendor_view(v)))
    }

    async fn create_vendor(&self, vendor: &NewVendor) -> CoreResult<Vendor> {
        let mut state = self.state.lock().await;
        if state.vendors.values().any(|v| v.user_id == vendor.user_id) {
            return Err(CoreError::Conflict(format!(
                "user {} already has a vendor profile",
                vendor.user_id
            )));
        }
        let Some(user) = state.users.get_mut(&vendor.user_id) else {
            return Err(CoreError::Conflict(format!("user {} does not exist", vendor.user_id)));
        };
        // A vendor profile implies the vendor role.
        if user.role == Role::Customer {
            user.role = Role::Vendor;
        }

        let id = state.next_id();
        let now = Utc::now();
        let p = &vendor.profile;
        let created = Vendor {
            id,
            user_id: vendor.user_id,
            company_name: p.company_name.clone(),
            description: p.description.clone(),
            logo_url: p.logo_url.clone(),
            website: p.website.clone(),
            contact_email: p.contact_email.clone(),
            contact_phone: p.contact_phone.clone(),
            commission_rate: p.commission_rate,
            is_verified: p.is_verified,
            created_at: now,
            updated_at: now,
            email: None,
            first_name: None,
            last_name: None,
            phone: None,
        };
        state.vendors.insert(id, created.clone());
        Ok(state.vendor_view(&created))
    }

    async fn update_vendor(&self, id: i64, profile: &VendorProfile) -> CoreResult<Vendor> {
        let mut state = self.state.lock().await;
        let vendor = state
            .vendors
            .get_mut(&id)
            .ok_or_else(|| CoreError::NotFound(format!("Vendor {}", id)))?;
        vendor.company_name = profile.company_name.clone();
        vendor.description = profile.description.clone();
        vendor.logo_url = profile.logo_url.clone();
        vendor.website = profile.website.clone();
        vendor.contact_email = profile.contact_email.clone();
        vendor.contact_phone = profile.contact_phone.clone();
        vendor.commission_rate = profile.commission_rate;
        vendor.is_verified = profile.is_verified;
        vendor.updated_at = Utc::now();
        let updated = vendor.clone();
        Ok(state.vendor_view(&updated))
    }

    async fn delete_vendor(&self, id: i64) -> CoreResult<()> {
        let mut state = self.state.lock().await;
        if state.vendors.remove(&id).is_none() {
            return Err(CoreError::NotFound(format!("Vendor {}", id)));
        }
        for tour in state.tours.values_mut().filter(|t| t.vendor_id == Some(id)) {
            tour.vendor_id = None;
        }
        Ok(())
    }
}

#[async_trait]
impl AvailabilityRepository for MemoryStore {
    async fn list_slots(&self, filter: &AvailabilityFilter) -> CoreResult<Vec<AvailabilitySlot>> {
        let state = self.state.lock().await;
        let mut slots: Vec<AvailabilitySlot> = state
            .slots
            .values()
            .filter(|s| filter.tour_id.map_or(true, |t| s.tour_id == t))
            .filter(|s| filter.date_from.map_or(true, |d| s.date >= d))
            .filter(|s| filter.date_to.map_or(true, |d| s.date <= d))
            .filter(|s| filter.is_available.map_or(true, |open| s.is_available == open))
            .filter(|s| {
                filter.vendor_id.map_or(true, |v| {
                    state.tours.get(&s.tour_id).and_then(|t| t.vendor_id) == Some(v)
                })
            })
            .map(|s| state.slot_view(s))
            .collect();
        slots.sort_by(|a, b| (a.date, a.start_time, a.id).cmp(&(b.date, b.start_time, b.id)));
        Ok(slots)
    }

    async fn available_slots(&self, tour_id: i64, date: NaiveDate) -> CoreResult<Vec<AvailabilitySlot>> {
        let state = self.state.lock().await;
        let mut slots: Vec<AvailabilitySlot> = state
            .slots
            .values()
            .filter(|s| s.tour_id == tour_id && s.date == date && s.is_bookable())
            .map(|s| state.slot_view(s))
            .collect();
        slots.sort_by_key(|s| (s.start_time, s.id));
        Ok(slots)
    }

    async fn get_slot(&self, id: i64) -> CoreResult<Option<AvailabilitySlot>> {
        let state = self.state.lock().await;
        Ok(state.slots.get(&id).map(|s| state.slot_view(s)))
    }

    async fn create_slot(&self, slot: &NewSlot) -> CoreResult<AvailabilitySlot> {
        let mut created = self.create_slots(std::slice::from_ref(slot)).await?;
        created
            .pop()
            .ok_or_else(|| CoreError::StoreError("slot insert returned nothing".to_string()))
    }

    async fn create_slots(&self, slots: &[NewSlot]) -> CoreResult<Vec<AvailabilitySlot>> {
        let mut state = self.state.lock().await;
        if let Some(missing) = slots.iter().find(|s| !state.tours.contains_key(&s.tour_id)) {
            return Err(CoreError::Conflict(format!("tour {} does not exist", missing.tour_id)));
        }

        let now = Utc::now();
        let mut created = Vec::with_capacity(slots.len());
        for slot in slots {
            let id = state.next_id();
            let s = &slot.schedule;
            let record = AvailabilitySlot {
                id,
                tour_id: slot.tour_id,
                date: slot.date,
                start_time: s.start_time,
                end_time: s.end_time,
                max_spots: s.max_spots,
                spots_booked: 0,
                price_adult: s.price_adult,
                price_child: s.price_child,
                is_available: s.is_available,
                created_at: now,
                updated_at: now,
                tour_name: None,
            };
            state.slots.insert(id, record.clone());
            created.push(state.slot_view(&record));
        }
        created.sort_by(|a, b| (a.date, a.start_time, a.id).cmp(&(b.date, b.start_time, b.id)));
        info!(count = created.len(), "Created availability slots");
        Ok(created)
    }

    async fn update_slot(&self, id: i64, update: &SlotUpdate) -> CoreResult<AvailabilitySlot> {
        let mut state = self.state.lock().await;
        update.check_against(state.slot(id)?)?;

        let slot = state
            .slots
            .get_mut(&id)
            .ok_or_else(|| CoreError::NotFound(format!("Availability {}", id)))?;
        let s = &update.schedule;
        slot.date = update.date;
        slot.start_time = s.start_time;
        slot.end_time = s.end_time;
        slot.max_spots = s.max_spots;
        slot.price_adult = s.price_adult;
        slot.price_child = s.price_child;
        slot.is_available = s.is_available;
        slot.updated_at = Utc::now();
        let updated = slot.clone();
        Ok(state.slot_view(&updated))
    }

    async fn delete_slot(&self, id: i64) -> CoreResult<()> {
        let mut state = self.state.lock().await;
        let slot = state.slot(id)?;
        if slot.spots_booked > 0 {
            return Err(CoreError::Conflict(format!(
                "Availability {} still holds {} booked seats",
                id, slot.spots_booked
            )));
        }
        if state.bookings.values().any(|b| b.availability_id == id) {
            return Err(CoreError::Conflict(format!("Availability {} is referenced by bookings", id)));
        }
        state.slots.remove(&id);
        Ok(())
    }
}

#[async_trait]
impl BookingRepository for MemoryStore {
    async fn list_bookings(&self, filter: &BookingFilter) -> CoreResult<Vec<Booking>> {
        let state = self.state.lock().await;
        let mut bookings: Vec<Booking> = state
            .bookings
            .values()
            .map(|b| state.booking_view(b))
            .filter(|b| filter.user_id.map_or(true, |u| b.user_id == Some(u)))
            .filter(|b| filter.tour_id.map_or(true, |t| b.tour_id == t))
            .filter(|b| filter.status.map_or(true, |s| b.status == s))
            .filter(|b| filter.payment_status.map_or(true, |p| b.payment_status == p))
            .filter(|b| filter.date_from.map_or(true, |d| b.tour_date.map_or(false, |td| td >= d)))
            .filter(|b| filter.date_to.map_or(true, |d| b.tour_date.map_or(false, |td| td <= d)))
            .filter(|b| {
                filter.vendor_id.map_or(true, |v| {
                    state.tours.get(&b.tour_id).and_then(|t| t.vendor_id) == Some(v)
                })
            })
            .collect();
        bookings.sort_by(|a, b| (b.booking_date, b.id).cmp(&(a.booking_date, a.id)));
        Ok(take_limit(bookings, filter.limit))
    }

    async fn get_booking(&self, id: i64) -> CoreResult<Option<Booking>> {
        let state = self.state.lock().await;
        Ok(state.bookings.get(&id).map(|b| state.booking_view(b)))
    }

    async fn get_booking_by_number(&self, booking_number: &str) -> CoreResult<Option<Booking>> {
        let state = self.state.lock().await;
        Ok(state
            .bookings
            .values()
            .find(|b| b.booking_number == booking_number)
            .map(|b| state.booking_view(b)))
    }

    async fn create_booking(&self, booking: &NewBooking) -> CoreResult<Booking> {
        let mut state = self.state.lock().await;

        let slot = state.slot(booking.availability_id)?.clone();
        let spots_booked = seats::plan_create(&slot, booking)?;

        if state.bookings.values().any(|b| b.booking_number == booking.booking_number) {
            return Err(CoreError::DuplicateBookingNumber(booking.booking_number.clone()));
        }
        if let Some(user_id) = booking.user_id {
            if !state.users.contains_key(&user_id) {
                return Err(CoreError::Conflict(format!("user {} does not exist", user_id)));
            }
        }

        let id = state.next_id();
        let now = Utc::now();
        let record = Booking {
            id,
            booking_number: booking.booking_number.clone(),
            user_id: booking.user_id,
            tour_id: booking.tour_id,
            availability_id: booking.availability_id,
            adults: booking.adults,
            children: booking.children,
            total_price: booking.total_price,
            special_requests: booking.special_requests.clone(),
            status: BookingStatus::Pending,
            payment_status: booking.payment_status,
            payment_intent_id: booking.payment_intent_id.clone(),
            booking_date: now,
            updated_at: now,
            tour_name: None,
            user_email: None,
            tour_date: None,
            tour_time: None,
        };
        state.bookings.insert(id, record.clone());
        for traveler in &booking.travelers {
            state.insert_traveler(id, traveler);
        }
        state.set_spots_booked(slot.id, spots_booked);

        info!(
            booking_id = id,
            booking_number = %record.booking_number,
            slot_id = slot.id,
            spots_booked,
            "Booking created"
        );
        Ok(state.booking_view(&record))
    }

    async fn update_booking(&self, id: i64, changes: &BookingChanges) -> CoreResult<Booking> {
        self.state.lock().await.apply_booking_changes(id, changes)
    }

    async fn delete_booking(&self, id: i64) -> CoreResult<()> {
        let mut state = self.state.lock().await;
        let existing = state.booking(id)?.clone();
        let slot = state.slot(existing.availability_id)?.clone();
        let spots_booked = seats::plan_delete(&existing, &slot)?;

        state.travelers.retain(|_, t| t.booking_id != id);
        state.payments.retain(|_, p| p.booking_id != id);
        state.bookings.remove(&id);
        if spots_booked != slot.spots_booked {
            state.set_spots_booked(slot.id, spots_booked);
        }

        info!(booking_id = id, slot_id = slot.id, spots_booked, "Booking deleted");
        Ok(())
    }

    async fn list_travelers(&self, booking_id: i64) -> CoreResult<Vec<Traveler>> {
        let state = self.state.lock().await;
        let mut travelers: Vec<Traveler> = state
            .travelers
            .values()
            .filter(|t| t.booking_id == booking_id)
            .cloned()
            .collect();
        travelers.sort_by(|a, b| b.is_lead.cmp(&a.is_lead).then(a.id.cmp(&b.id)));
        Ok(travelers)
    }

    async fn add_traveler(&self, booking_id: i64, traveler: &NewTraveler) -> CoreResult<Traveler> {
        let mut state = self.state.lock().await;
        state.booking(booking_id)?;
        if traveler.is_lead
            && state
                .travelers
                .values()
                .any(|t| t.booking_id == booking_id && t.is_lead)
        {
            return Err(CoreError::Conflict(format!(
                "Booking {} already has a lead traveler",
                booking_id
            )));
        }
        Ok(state.insert_traveler(booking_id, traveler))
    }
}

#[async_trait]
impl PaymentRepository for MemoryStore {
    async fn list_payments(&self, filter: &PaymentFilter) -> CoreResult<Vec<Payment>> {
        let state = self.state.lock().await;
        let mut payments: Vec<Payment> = state
            .payments
            .values()
            .filter(|p| filter.booking_id.map_or(true, |b| p.booking_id == b))
            .filter(|p| filter.status.map_or(true, |s| p.status == s))
            .filter(|p| {
                filter
                    .payment_method
                    .as_deref()
                    .map_or(true, |m| p.payment_method == m)
            })
            .filter(|p| filter.date_from.map_or(true, |d| p.payment_date.date_naive() >= d))
            .filter(|p| filter.date_to.map_or(true, |d| p.payment_date.date_naive() <= d))
            .filter(|p| {
                let booking = state.bookings.get(&p.booking_id);
                filter
                    .user_id
                    .map_or(true, |u| booking.and_then(|b| b.user_id) == Some(u))
                    && filter.vendor_id.map_or(true, |v| {
                        booking
                            .and_then(|b| state.tours.get(&b.tour_id))
                            .and_then(|t| t.vendor_id)
                            == Some(v)
                    })
            })
            .map(|p| state.payment_view(p))
            .collect();
        payments.sort_by(|a, b| (b.payment_date, b.id).cmp(&(a.payment_date, a.id)));
        Ok(take_limit(payments, filter.limit))
    }

    async fn get_payment(&self, id: i64) -> CoreResult<Option<Payment>> {
        let state = self.state.lock().await;
        Ok(state.payments.get(&id).map(|p| state.payment_view(p)))
    }

    async fn record_payment(&self, new_payment: &NewPayment) -> CoreResult<Payment> {
        let mut state = self.state.lock().await;
        state.booking(new_payment.booking_id)?;

        // Seat moves can fail; apply the booking side first so a failure leaves nothing behind.
        state.sync_booking_with_payment(
            new_payment.booking_id,
            payment::PaymentEvent::Recorded,
            new_payment.status,
            new_payment.payment_intent_id.as_deref(),
        )?;

        let id = state.next_id();
        let now = Utc::now();
        let record = Payment {
            id,
            booking_id: new_payment.booking_id,
            amount: new_payment.amount,
            currency: new_payment.currency.clone().unwrap_or_else(|| "USD".to_string()),
            payment_method: new_payment.payment_method.clone(),
            payment_intent_id: new_payment.payment_intent_id.clone(),
            status: new_payment.status,
            refund_amount: Decimal::ZERO,
            payment_date: now,
            updated_at: now,
            booking_number: None,
            user_email: None,
            tour_name: None,
        };
        state.payments.insert(id, record.clone());

        info!(payment_id = id, booking_id = record.booking_id, status = %record.status, "Payment recorded");
        Ok(state.payment_view(&record))
    }

    async fn update_payment(&self, id: i64, update: &PaymentUpdate) -> CoreResult<Payment> {
        let mut state = self.state.lock().await;
        let current = state
            .payments
            .get(&id)
            .cloned()
            .ok_or_else(|| CoreError::NotFound(format!("Payment {}", id)))?;
        update.validate(&current)?;

        state.sync_booking_with_payment(
            current.booking_id,
            payment::PaymentEvent::Updated,
            update.status,
            current.payment_intent_id.as_deref(),
        )?;

        let payment = state
            .payments
            .get_mut(&id)
            .ok_or_else(|| CoreError::NotFound(format!("Payment {}", id)))?;
        payment.status = update.status;
        if let Some(refund) = update.refund_amount {
            payment.refund_amount = refund;
        }
        payment.updated_at = Utc::now();
        let updated = payment.clone();

        info!(payment_id = id, status = %updated.status, "Payment updated");
        Ok(state.payment_view(&updated))
    }
}
