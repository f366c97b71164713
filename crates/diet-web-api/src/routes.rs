
use std::collections::HashMap;

use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    routing::{get, patch, post, put},
    Router,
};

use diet_engine::{
    edit::MIN_QUANTITY,
    raw::RawDiet,
    ComposeError, DailyDiet, EditSession, FoodDraft, FoodRecord, ItemPath,
    LineItem, MealSlot, Nutrient, Role,
};

use crate::config::Config;

use self::{
    data::{
        Collections, Page, Patient, PatientDiet, PatientDraft,
        PatientUpdate, Store, StoreError,
    },
    export::{ExportClient, ExportLink},
};

mod data;
mod export;
mod helpers;
use helpers::*;

const DEFAULT_LIMIT: u32 = 100;
const MAX_LIMIT: u32 = 1000;

type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Clone, FromRef)]
struct AppState {
    store: Store,
    export: ExportClient,
}

impl AppState {
    async fn new(config: &Config) -> Self {
        let db = match &config.db {
            Some(db) => {
                tracing::info!("connecting to db at {}", db.url);
                connect_db(db).await
            },
            None => {
                tracing::info!("no db specified");
                None
            },
        };
        let store = Store::new(db.as_ref().map(Collections::new));

        let export = ExportClient::new(&config.export);
        if !export.is_configured() {
            tracing::warn!("no export service configured, diet export is disabled");
        }

        tracing::info!(
            store = store.kind(),
            export = export.is_configured(),
            "app state ready",
        );
        Self { store, export }
    }
}

pub async fn make_router(config: &Config) -> Router {
    router(AppState::new(config).await)
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/foods", get(list_foods).post(create_food))
        .route("/api/foods/:id", get(get_food))
        .route("/api/foods/:id/equivalent", get(food_equivalent))
        .route("/api/patients", get(list_patients).post(create_patient))
        .route("/api/patients/with-diet", get(patients_with_diet))
        .route("/api/patients/:id", get(get_patient).put(update_patient).delete(delete_patient))
        .route("/api/patients/:id/diet", get(get_diet).put(put_diet))
        .route("/api/patients/:id/diet/import", post(import_diet))
        .route("/api/patients/:id/diet/export", get(export_diet))
        .route("/api/patients/:id/diet/:slot/import", post(import_meal))
        .route("/api/patients/:id/diet/:slot/notes", put(set_meal_notes))
        .route("/api/patients/:id/diet/:slot/items", post(add_item))
        .route("/api/patients/:id/diet/:slot/items/:entry",
            patch(edit_item).delete(remove_item))
        .route("/api/patients/:id/diet/:slot/items/:entry/selection", put(select_item))
        .route("/api/patients/:id/diet/:slot/items/:entry/equivalents", post(add_equivalent))
        .route("/api/patients/:id/diet/:slot/items/:entry/equivalents/:index",
            patch(edit_equivalent).delete(remove_equivalent))
        .with_state(state)
}

#[derive(Debug, Default, serde::Deserialize)]
struct ListQuery {
    search: Option<String>,
    limit: Option<u32>,
    offset: Option<u64>,
}

impl ListQuery {
    fn search(&self) -> Option<&str> {
        self.search.as_deref().map(str::trim).filter(|v| !v.is_empty())
    }

    fn limit(&self) -> Result<u32, ApiError> {
        match self.limit.unwrap_or(DEFAULT_LIMIT) {
            v @ 1..=MAX_LIMIT => Ok(v),
            v => Err(ApiError::BadRequest(format!("limit must be between 1 and {MAX_LIMIT}, got {v}"))),
        }
    }

    fn offset(&self) -> u64 { self.offset.unwrap_or(0) }
}

#[derive(Debug, serde::Serialize)]
struct Health {
    status: &'static str,
}

async fn health(State(store): State<Store>) -> ApiResult<Health> {
    store.ping().await?;
    Ok(Json(Health { status: "ok" }))
}

async fn list_foods(
    Query(q): Query<ListQuery>,
    State(store): State<Store>,
) -> ApiResult<Page<FoodRecord>> {
    Ok(Json(store.list_foods(q.search(), q.limit()?, q.offset()).await?))
}

async fn create_food(
    State(store): State<Store>,
    Json(draft): Json<FoodDraft>,
) -> Result<(StatusCode, Json<FoodRecord>), ApiError> {
    Ok((StatusCode::CREATED, Json(store.create_food(draft).await?)))
}

async fn get_food(
    Path(id): Path<i64>,
    State(store): State<Store>,
) -> ApiResult<FoodRecord> {
    Ok(Json(store.get_food(id).await?))
}

#[derive(Debug, serde::Deserialize)]
struct EquivalentQuery {
    target_kcal: f64,
}

#[derive(Debug, serde::Serialize)]
struct EquivalentPreview {
    quantity: f64,
    substitutable: bool,
}

async fn food_equivalent(
    Path(id): Path<i64>,
    Query(q): Query<EquivalentQuery>,
    State(store): State<Store>,
) -> ApiResult<EquivalentPreview> {
    if !q.target_kcal.is_finite() {
        return Err(ApiError::BadRequest(format!("target_kcal must be a number")));
    }

    let food = store.get_food(id).await?;
    if q.target_kcal <= 0.0 {
        return Ok(Json(EquivalentPreview { quantity: 0.0, substitutable: false }));
    }

    Ok(Json(match LineItem::equivalent_for(&food, q.target_kcal) {
        Ok(item) => EquivalentPreview { quantity: item.quantity, substitutable: true },
        Err(ComposeError::NotSubstitutable { .. }) =>
            EquivalentPreview { quantity: 0.0, substitutable: false },
    }))
}

async fn list_patients(
    Query(q): Query<ListQuery>,
    State(store): State<Store>,
) -> ApiResult<Page<Patient>> {
    Ok(Json(store.list_patients(q.search(), q.limit()?, q.offset()).await?))
}

async fn create_patient(
    State(store): State<Store>,
    Json(draft): Json<PatientDraft>,
) -> Result<(StatusCode, Json<Patient>), ApiError> {
    Ok((StatusCode::CREATED, Json(store.create_patient(draft).await?)))
}

async fn get_patient(
    Path(id): Path<i64>,
    State(store): State<Store>,
) -> ApiResult<Patient> {
    Ok(Json(store.get_patient(id).await?))
}

async fn update_patient(
    Path(id): Path<i64>,
    State(store): State<Store>,
    Json(update): Json<PatientUpdate>,
) -> ApiResult<Patient> {
    Ok(Json(store.update_patient(id, update).await?))
}

async fn delete_patient(
    Path(id): Path<i64>,
    State(store): State<Store>,
) -> Result<StatusCode, ApiError> {
    store.delete_patient(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn patients_with_diet(
    Query(q): Query<ListQuery>,
    State(store): State<Store>,
) -> ApiResult<Page<PatientDiet>> {
    Ok(Json(store.list_patients_with_diet(q.limit()?, q.offset()).await?))
}

/// The stored diet of an existing patient, or an empty one.
async fn load_diet(store: &Store, patient_id: i64) -> Result<DailyDiet, ApiError> {
    store.get_patient(patient_id).await?;
    Ok(store.get_diet(patient_id).await?.unwrap_or_else(DailyDiet::empty))
}

async fn save_diet(store: &Store, patient_id: i64, diet: DailyDiet) -> ApiResult<DailyDiet> {
    store.put_diet(patient_id, &diet).await?;
    Ok(Json(diet))
}

async fn get_diet(
    Path(id): Path<i64>,
    State(store): State<Store>,
) -> ApiResult<DailyDiet> {
    Ok(Json(load_diet(&store, id).await?))
}

async fn put_diet(
    Path(id): Path<i64>,
    State(store): State<Store>,
    Json(raw): Json<RawDiet>,
) -> ApiResult<DailyDiet> {
    store.get_patient(id).await?;
    save_diet(&store, id, raw.into()).await
}

#[derive(Debug, serde::Deserialize)]
struct NewItem {
    food_id: i64,
    quantity: f64,
}

async fn add_item(
    Path((id, slot)): Path<(i64, MealSlot)>,
    State(store): State<Store>,
    Json(body): Json<NewItem>,
) -> ApiResult<DailyDiet> {
    if !body.quantity.is_finite() {
        return Err(ApiError::BadRequest(format!("quantity must be a number")));
    }

    let food = store.get_food(body.food_id).await?;
    let diet = load_diet(&store, id).await?;
    let item = LineItem::from_food(&food, body.quantity.max(MIN_QUANTITY), Role::Principal);

    tracing::info!("adding {} to {slot} of patient {id}", food.name);
    save_diet(&store, id, diet.with_meal(slot, diet.meal(slot).with_entry(item))).await
}

#[derive(Debug, serde::Deserialize)]
struct NewEquivalent {
    food_id: i64,
}

async fn add_equivalent(
    Path((id, slot, entry)): Path<(i64, MealSlot, usize)>,
    State(store): State<Store>,
    Json(body): Json<NewEquivalent>,
) -> ApiResult<DailyDiet> {
    let food = store.get_food(body.food_id).await?;
    let diet = load_diet(&store, id).await?
        .try_with_meal(slot, |meal| meal.with_equivalent_food(entry, &food))?;
    save_diet(&store, id, diet).await
}

#[derive(Debug, serde::Deserialize)]
struct SelectionBody {
    equivalent: Option<usize>,
}

async fn select_item(
    Path((id, slot, entry)): Path<(i64, MealSlot, usize)>,
    State(store): State<Store>,
    Json(body): Json<SelectionBody>,
) -> ApiResult<DailyDiet> {
    let diet = load_diet(&store, id).await?
        .try_with_meal(slot, |meal| meal.with_selection(entry, body.equivalent.into()))?;
    save_diet(&store, id, diet).await
}

/// Changes to a single line item, applied in the order quantity, nutrient
/// overrides, name.
#[derive(Debug, Default, serde::Deserialize)]
struct ItemEdit {
    quantity: Option<f64>,
    name: Option<String>,
    #[serde(default)]
    nutrients: HashMap<Nutrient, f64>,
}

impl ItemEdit {
    fn apply(self, item: &LineItem) -> Result<LineItem, ApiError> {
        let mut session = EditSession::begin(item.clone());
        if let Some(quantity) = self.quantity {
            session.set_quantity(quantity);
        }
        for (nutrient, value) in self.nutrients {
            session.set_nutrient(nutrient, value);
        }
        if let Some(name) = self.name {
            let name = name.trim();
            if name.is_empty() {
                return Err(ApiError::BadRequest(format!("name must not be empty")));
            }
            session.set_name(name);
        }
        Ok(session.finish())
    }
}

async fn edit_at(
    store: &Store, id: i64, slot: MealSlot,
    path: ItemPath, edit: ItemEdit,
) -> ApiResult<DailyDiet> {
    let diet = load_diet(store, id).await?;
    let item = edit.apply(diet.meal(slot).item(path)?)?;
    let diet = diet.try_with_meal(slot, |meal| meal.with_item(path, item))?;
    save_diet(store, id, diet).await
}

async fn remove_at(
    store: &Store, id: i64, slot: MealSlot, path: ItemPath,
) -> ApiResult<DailyDiet> {
    let diet = load_diet(store, id).await?
        .try_with_meal(slot, |meal| meal.without(path))?;
    save_diet(store, id, diet).await
}

async fn edit_item(
    Path((id, slot, entry)): Path<(i64, MealSlot, usize)>,
    State(store): State<Store>,
    Json(edit): Json<ItemEdit>,
) -> ApiResult<DailyDiet> {
    edit_at(&store, id, slot, ItemPath::Principal(entry), edit).await
}

async fn remove_item(
    Path((id, slot, entry)): Path<(i64, MealSlot, usize)>,
    State(store): State<Store>,
) -> ApiResult<DailyDiet> {
    remove_at(&store, id, slot, ItemPath::Principal(entry)).await
}

async fn edit_equivalent(
    Path((id, slot, entry, index)): Path<(i64, MealSlot, usize, usize)>,
    State(store): State<Store>,
    Json(edit): Json<ItemEdit>,
) -> ApiResult<DailyDiet> {
    edit_at(&store, id, slot, ItemPath::Equivalent { entry, index }, edit).await
}

async fn remove_equivalent(
    Path((id, slot, entry, index)): Path<(i64, MealSlot, usize, usize)>,
    State(store): State<Store>,
) -> ApiResult<DailyDiet> {
    remove_at(&store, id, slot, ItemPath::Equivalent { entry, index }).await
}

#[derive(Debug, serde::Deserialize)]
struct NotesBody {
    notes: String,
}

async fn set_meal_notes(
    Path((id, slot)): Path<(i64, MealSlot)>,
    State(store): State<Store>,
    Json(body): Json<NotesBody>,
) -> ApiResult<DailyDiet> {
    let diet = load_diet(&store, id).await?;
    let meal = diet.meal(slot).with_notes(body.notes);
    save_diet(&store, id, diet.with_meal(slot, meal)).await
}

/// The diet being edited, either the unsaved draft sent along or the stored one.
async fn current_diet(
    store: &Store, patient_id: i64, draft: Option<RawDiet>,
) -> Result<DailyDiet, ApiError> {
    match draft {
        Some(draft) => {
            store.get_patient(patient_id).await?;
            Ok(draft.into())
        },
        None => load_diet(store, patient_id).await,
    }
}

async fn source_diet(store: &Store, patient_id: i64) -> Result<DailyDiet, ApiError> {
    store.get_patient(patient_id).await?;
    store.get_diet(patient_id).await?
        .ok_or(ApiError::Store(StoreError::NotFound { kind: "diet", id: patient_id }))
}

#[derive(Debug, serde::Deserialize)]
struct DietImport {
    source_patient_id: i64,
    #[serde(default)]
    slots: Vec<MealSlot>,
    draft: Option<RawDiet>,
}

/// Merges another patient's diet into a draft. Nothing is saved.
async fn import_diet(
    Path(id): Path<i64>,
    State(store): State<Store>,
    Json(body): Json<DietImport>,
) -> ApiResult<DailyDiet> {
    let current = current_diet(&store, id, body.draft).await?;
    let source = source_diet(&store, body.source_patient_id).await?;

    tracing::info!("importing diet of patient {} into patient {id}", body.source_patient_id);
    Ok(Json(current.with_imported_diet(&source, &body.slots)))
}

#[derive(Debug, serde::Deserialize)]
struct MealImport {
    source_patient_id: i64,
    draft: Option<RawDiet>,
}

async fn import_meal(
    Path((id, slot)): Path<(i64, MealSlot)>,
    State(store): State<Store>,
    Json(body): Json<MealImport>,
) -> ApiResult<DailyDiet> {
    let current = current_diet(&store, id, body.draft).await?;
    let source = source_diet(&store, body.source_patient_id).await?;

    tracing::info!("importing {slot} of patient {} into patient {id}", body.source_patient_id);
    Ok(Json(current.with_imported_meal(slot, &source)))
}

async fn export_diet(
    Path(id): Path<i64>,
    State(store): State<Store>,
    State(export): State<ExportClient>,
) -> ApiResult<ExportLink> {
    let patient = store.get_patient(id).await?;
    let diet = store.get_diet(id).await?.unwrap_or_else(DailyDiet::empty);
    Ok(Json(export.export(&patient, &diet).await?))
}
