use std::{collections::BTreeMap, sync::Arc};

use chrono::Utc;
use diet_engine::{DailyDiet, FoodDraft, FoodRecord};
use mongodb::{
    bson::{doc, Document},
    options::{
        FindOneAndUpdateOptions, FindOptions,
        ReplaceOptions, ReturnDocument,
    },
    Collection,
};
use serde::de::DeserializeOwned;
use tokio::sync::RwLock;

use super::helpers::search_pattern;

mod data;
pub use data::*;

/// Patients, foods and diets, kept in mongodb or, without a db, in memory.
#[derive(Clone)]
pub enum Store {
    Mongo(Collections),
    Memory(Arc<RwLock<MemoryData>>),
}

impl Store {
    pub fn new(collections: Option<Collections>) -> Self {
        match collections {
            Some(v) => Store::Mongo(v),
            None => {
                tracing::warn!("no db available, data will not outlive the process");
                Self::memory()
            },
        }
    }

    pub fn memory() -> Self {
        Store::Memory(Arc::new(RwLock::new(MemoryData::default())))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Store::Mongo(_) => "mongodb",
            Store::Memory(_) => "memory",
        }
    }

    pub async fn ping(&self) -> Result<(), StoreError> {
        match self {
            Store::Mongo(c) => c.ping().await,
            Store::Memory(_) => Ok(()),
        }
    }

    pub async fn list_foods(
        &self, search: Option<&str>, limit: u32, offset: u64,
    ) -> Result<Page<FoodRecord>, StoreError> {
        match self {
            Store::Mongo(c) => {
                let filter = match search {
                    Some(s) => doc! { "name": { "$regex": search_pattern(s), "$options": "i" } },
                    None => doc! {},
                };
                Ok(find_page(&c.foods, filter, limit, offset).await?)
            },
            Store::Memory(m) => {
                let m = m.read().await;
                let found = page(m.foods.values()
                    .cloned()
                    .filter(|v| search.map_or(true, |s| contains_ignore_case(&v.name, s))),
                    limit, offset);
                Ok(found)
            },
        }
    }

    pub async fn get_food(&self, id: i64) -> Result<FoodRecord, StoreError> {
        let food = match self {
            Store::Mongo(c) => c.foods.find_one(doc! { "id": id }, None).await?,
            Store::Memory(m) => m.read().await.foods.get(&id).cloned(),
        };
        food.ok_or(StoreError::NotFound { kind: "food", id })
    }

    pub async fn create_food(&self, draft: FoodDraft) -> Result<FoodRecord, StoreError> {
        draft.validate()?;

        let food = match self {
            Store::Mongo(c) => {
                let food = draft.into_record(c.next_id("foods").await?)?;
                c.foods.insert_one(&food, None).await?;
                food
            },
            Store::Memory(m) => {
                let mut m = m.write().await;
                let food = draft.into_record(m.next_id())?;
                m.foods.insert(food.id, food.clone());
                food
            },
        };

        tracing::info!("created food {} ({})", food.id, food.name);
        Ok(food)
    }

    pub async fn list_patients(
        &self, search: Option<&str>, limit: u32, offset: u64,
    ) -> Result<Page<Patient>, StoreError> {
        match self {
            Store::Mongo(c) => {
                let filter = match search {
                    Some(s) => {
                        let pattern = search_pattern(s);
                        doc! { "$or": [
                            { "first_name": { "$regex": &pattern, "$options": "i" } },
                            { "last_name": { "$regex": &pattern, "$options": "i" } },
                            { "email": { "$regex": &pattern, "$options": "i" } },
                        ] }
                    },
                    None => doc! {},
                };
                Ok(find_page(&c.patients, filter, limit, offset).await?)
            },
            Store::Memory(m) => {
                let m = m.read().await;
                let found = page(m.patients.values()
                    .cloned()
                    .filter(|v| search.map_or(true, |s| v.matches(s))),
                    limit, offset);
                Ok(found)
            },
        }
    }

    pub async fn get_patient(&self, id: i64) -> Result<Patient, StoreError> {
        let patient = match self {
            Store::Mongo(c) => c.patients.find_one(doc! { "id": id }, None).await?,
            Store::Memory(m) => m.read().await.patients.get(&id).cloned(),
        };
        patient.ok_or(StoreError::NotFound { kind: "patient", id })
    }

    pub async fn create_patient(&self, draft: PatientDraft) -> Result<Patient, StoreError> {
        let patient = match self {
            Store::Mongo(c) => {
                let patient = draft.into_patient(c.next_id("patients").await?)?;
                c.patients.insert_one(&patient, None).await?;
                patient
            },
            Store::Memory(m) => {
                let mut m = m.write().await;
                let patient = draft.into_patient(m.next_id())?;
                m.patients.insert(patient.id, patient.clone());
                patient
            },
        };

        tracing::info!("created patient {}", patient.id);
        Ok(patient)
    }

    pub async fn update_patient(
        &self, id: i64, update: PatientUpdate,
    ) -> Result<Patient, StoreError> {
        let mut patient = self.get_patient(id).await?;
        patient.apply(update)?;

        match self {
            Store::Mongo(c) => {
                c.patients.replace_one(doc! { "id": id }, &patient, None).await?;
            },
            Store::Memory(m) => {
                m.write().await.patients.insert(id, patient.clone());
            },
        }

        tracing::info!("updated patient {id}");
        Ok(patient)
    }

    /// Removes the patient and their diet.
    pub async fn delete_patient(&self, id: i64) -> Result<(), StoreError> {
        let deleted = match self {
            Store::Mongo(c) => {
                let res = c.patients.delete_one(doc! { "id": id }, None).await?;
                c.diets.delete_one(doc! { "patient_id": id }, None).await?;
                res.deleted_count > 0
            },
            Store::Memory(m) => {
                let mut m = m.write().await;
                m.diets.remove(&id);
                m.patients.remove(&id).is_some()
            },
        };

        if !deleted {
            return Err(StoreError::NotFound { kind: "patient", id });
        }
        tracing::info!("deleted patient {id}");
        Ok(())
    }

    pub async fn get_diet(&self, patient_id: i64) -> Result<Option<DailyDiet>, StoreError> {
        Ok(match self {
            Store::Mongo(c) => c.diets
                .find_one(doc! { "patient_id": patient_id }, None).await?
                .map(|v| v.diet.into()),
            Store::Memory(m) => m.read().await.diets.get(&patient_id).cloned(),
        })
    }

    /// Replaces the whole diet of a patient.
    pub async fn put_diet(&self, patient_id: i64, diet: &DailyDiet) -> Result<(), StoreError> {
        match self {
            Store::Mongo(c) => {
                c.diets.clone_with_type::<DietRecord>().replace_one(
                    doc! { "patient_id": patient_id },
                    DietRecord { patient_id, diet, updated_at: Utc::now() },
                    ReplaceOptions::builder()
                        .upsert(true)
                    .build(),
                ).await?;
            },
            Store::Memory(m) => {
                m.write().await.diets.insert(patient_id, diet.clone());
            },
        }

        tracing::info!("saved diet of patient {patient_id} ({} kcal)", diet.totals.kcal);
        Ok(())
    }

    /// Patients that have a saved diet. Diets left behind by a removed
    /// patient are not listed and not counted.
    pub async fn list_patients_with_diet(
        &self, limit: u32, offset: u64,
    ) -> Result<Page<PatientDiet>, StoreError> {
        let diets = match self {
            Store::Mongo(c) => {
                let ids = c.patients.distinct("id", None, None).await?;
                let diets = find_page(
                    &c.diets, doc! { "patient_id": { "$in": ids } },
                    limit, offset,
                ).await?;
                Page {
                    total: diets.total,
                    data: diets.data.into_iter()
                        .map(|v| (v.patient_id, DailyDiet::from(v.diet)))
                    .collect(),
                }
            },
            Store::Memory(m) => {
                let m = m.read().await;
                let found = page(m.diets.iter()
                    .filter(|(k, _)| m.patients.contains_key(*k))
                    .map(|(k, v)| (*k, v.clone())),
                    limit, offset);
                found
            },
        };

        let mut data = Vec::with_capacity(diets.data.len());
        for (patient_id, diet) in diets.data {
            match self.get_patient(patient_id).await {
                Ok(patient) => data.push(PatientDiet { patient, diet }),
                // removed while listing
                Err(StoreError::NotFound { .. }) =>
                    tracing::warn!("diet without patient: {patient_id}"),
                Err(err) => return Err(err),
            }
        }

        Ok(Page { data, total: diets.total })
    }
}

fn page<T>(
    items: impl Iterator<Item = T>,
    limit: u32, offset: u64,
) -> Page<T> {
    let items: Vec<_> = items.collect();
    let total = items.len() as u64;
    let data = items.into_iter()
        .skip(offset as usize)
        .take(limit as usize)
    .collect();
    Page { data, total }
}

async fn find_page<T>(
    collection: &Collection<T>, filter: Document,
    limit: u32, offset: u64,
) -> mongodb::error::Result<Page<T>>
where T: DeserializeOwned + Unpin + Send + Sync
{
    let total = collection.count_documents(filter.clone(), None).await?;
    let mut cursor = collection.find(filter, FindOptions::builder()
        .sort(doc! { "_id": 1 })
        .skip(offset)
        .limit(i64::from(limit))
    .build()).await?;

    let mut data = Vec::new();
    while cursor.advance().await? {
        data.push(cursor.deserialize_current()?);
    }
    Ok(Page { data, total })
}

#[derive(Debug, Default)]
pub struct MemoryData {
    last_id: i64,
    foods: BTreeMap<i64, FoodRecord>,
    patients: BTreeMap<i64, Patient>,
    diets: BTreeMap<i64, DailyDiet>,
}

impl MemoryData {
    fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }
}

#[derive(Clone)]
pub struct Collections {
    db: mongodb::Database,
    foods: Collection<FoodRecord>,
    patients: Collection<Patient>,
    diets: Collection<StoredDiet>,
    counters: Collection<Document>,
}

impl Collections {
    pub fn new(db: &mongodb::Database) -> Self {
        Self {
            db: db.clone(),
            foods: db.collection("foods"),
            patients: db.collection("patients"),
            diets: db.collection("diets"),
            counters: db.collection("counters"),
        }
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.db.run_command(doc! { "ping": 1 }, None).await?;
        Ok(())
    }

    async fn next_id(&self, name: &'static str) -> Result<i64, StoreError> {
        let counter = self.counters.find_one_and_update(
            doc! { "_id": name },
            doc! { "$inc": { "seq": 1_i64 } },
            FindOneAndUpdateOptions::builder()
                .upsert(true)
                .return_document(ReturnDocument::After)
            .build(),
        ).await?;

        counter
            .and_then(|v| v.get_i64("seq").ok())
        .ok_or(StoreError::Counter(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(name: &str, kcal: Option<f64>) -> FoodDraft {
        FoodDraft { name: name.into(), kcal, ..Default::default() }
    }

    #[tokio::test]
    async fn foods_are_searchable_and_paged() {
        let store = Store::memory();
        for name in ["Pasta di semola", "Pane integrale", "Pasta all'uovo", "Mela"] {
            store.create_food(draft(name, Some(100.0))).await.unwrap();
        }

        let page = store.list_foods(Some("PASTA"), 1, 1).await.unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.data.len(), 1);
        assert_eq!(page.data[0].name, "Pasta all'uovo");

        let all = store.list_foods(None, 100, 0).await.unwrap();
        assert_eq!(all.total, 4);
    }

    #[tokio::test]
    async fn invalid_food_is_not_stored() {
        let store = Store::memory();
        assert!(matches!(
            store.create_food(draft("   ", None)).await,
            Err(StoreError::InvalidFood(_))
        ));
        assert_eq!(store.list_foods(None, 10, 0).await.unwrap().total, 0);
    }

    #[tokio::test]
    async fn deleting_a_patient_drops_their_diet() {
        let store = Store::memory();
        let patient = store.create_patient(PatientDraft {
            first_name: "Luca".into(), last_name: "Bianchi".into(), ..Default::default()
        }).await.unwrap();

        store.put_diet(patient.id, &DailyDiet::empty().with_notes("x")).await.unwrap();
        assert_eq!(store.list_patients_with_diet(10, 0).await.unwrap().total, 1);

        store.delete_patient(patient.id).await.unwrap();
        assert!(store.get_diet(patient.id).await.unwrap().is_none());
        assert_eq!(store.list_patients_with_diet(10, 0).await.unwrap().total, 0);
        assert!(matches!(
            store.delete_patient(patient.id).await,
            Err(StoreError::NotFound { kind: "patient", .. })
        ));
    }

    #[tokio::test]
    async fn diets_without_a_patient_are_not_listed() {
        let store = Store::memory();
        store.put_diet(0, &DailyDiet::empty()).await.unwrap();
        let patient = store.create_patient(PatientDraft {
            first_name: "Giulia".into(), last_name: "Verdi".into(), ..Default::default()
        }).await.unwrap();
        store.put_diet(patient.id, &DailyDiet::empty()).await.unwrap();

        let page = store.list_patients_with_diet(1, 0).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.data.len(), 1);
        assert_eq!(page.data[0].patient.id, patient.id);
    }
}
