//! People in the expense-sharing group

use serde_json::Value;

use super::Ledger;
use crate::context::RunContext;
use crate::error::{Error, Result};
use crate::models::Person;
use crate::store::{Entity, Query};

pub const PEOPLE_PARTITION: &str = "PEOPLE";

fn person_from_entity(entity: &Entity) -> Person {
    let email = entity
        .get_str("Email")
        .filter(|e| !e.is_empty())
        .unwrap_or(entity.row_key.as_str())
        .to_string();

    // Accounts are a JSON array encoded as a string
    let account_numbers = match entity.get("Accounts") {
        Some(Value::String(s)) if !s.is_empty() => serde_json::from_str(s).unwrap_or_default(),
        Some(v @ Value::Array(_)) => serde_json::from_value(v.clone()).unwrap_or_default(),
        _ => Vec::new(),
    };

    Person::new(entity.get_str("Name").unwrap_or_default(), email, account_numbers)
}

impl Ledger {
    /// All people, ordered by email
    pub async fn list_people(&self, ctx: &RunContext) -> Result<Vec<Person>> {
        let entities = ctx
            .guard(
                "list people",
                self.store
                    .list_entities(&self.tables.people, &Query::partition(PEOPLE_PARTITION)),
            )
            .await?;
        Ok(entities.iter().map(person_from_entity).collect())
    }

    /// Create or replace a person, keyed by email
    pub async fn save_person(&self, ctx: &RunContext, person: &Person) -> Result<()> {
        if person.email.trim().is_empty() {
            return Err(Error::InvalidData("Person email is empty".to_string()));
        }
        let accounts = serde_json::to_string(&person.account_numbers)?;
        let entity = Entity::new(PEOPLE_PARTITION, person.email.as_str())
            .with("Name", person.name.as_str())
            .with("Email", person.email.as_str())
            .with("Accounts", accounts);
        ctx.guard(
            "save person",
            self.store.upsert_entity(&self.tables.people, entity),
        )
        .await
    }
}
