//! Group membership command implementations

use anyhow::{Context, Result};
use tally_core::{Person, RunContext, Services};

use super::truncate;

pub async fn cmd_people_list(services: &Services) -> Result<Vec<Person>> {
    let people = services
        .ledger
        .list_people(&RunContext::background())
        .await
        .context("Failed to list people")?;

    if people.is_empty() {
        println!("No people yet. Add one with 'tally people add'.");
        return Ok(people);
    }

    println!("   {:<20} │ {:<30} │ Accounts", "Name", "Email");
    println!("   {}", "─".repeat(70));
    for person in &people {
        let accounts: Vec<String> = person.account_numbers.iter().map(|a| a.to_string()).collect();
        println!(
            "   {:<20} │ {:<30} │ {}",
            truncate(&person.name, 20),
            truncate(&person.email, 30),
            accounts.join(", ")
        );
    }
    Ok(people)
}

pub async fn cmd_people_add(services: &Services, name: &str, email: &str, accounts: Vec<i64>) -> Result<Person> {
    if accounts.is_empty() {
        println!("⚠️  No accounts given; {} will not be attributed any transactions.", name);
    }

    let person = Person::new(name, email, accounts);
    services
        .ledger
        .save_person(&RunContext::background(), &person)
        .await
        .context("Failed to save person")?;

    println!("✓ Saved {} <{}>", person.name, person.email);
    Ok(person)
}
