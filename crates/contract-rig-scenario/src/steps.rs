// crates/contract-rig-scenario/src/steps.rs
// ============================================================================
// Module: Built-in Steps
// Description: Request, assertion, capture and fixture step library.
// Purpose: Cover the scenario vocabulary used by contract suites.
// Dependencies: futures, serde_json
// ============================================================================

//! ## Overview
//! Step arguments are substituted before use: paths, headers and expected
//! values in plain mode, bodies and JSON expectations in JSON mode so they
//! stay parseable.
//!
//! | Category | Pattern |
//! |---|---|
//! | target | `I am testing the {string} backend` |
//! | session | `I use the token {string}`, `I set the header {string} to {string}` |
//! | request | `I send a {word} request to {string}` (+ `with body:`, `with query parameters:`, `with headers:`) |
//! | assertion | `the response status should be {int}`, `the response field {string} should be {string}`, `... should match:`, `... should exist`, `... should not exist`, `the response body should match:`, `the response header {string} should be {string}` |
//! | capture | `I store the response field {string} as {string}`, `I store the response body as {string}` |
//! | fixture | `the database is clean`, `the table {string} contains the rows:`, `the table {string} should have {int} rows`, `the table {string} should contain a row with:` |

use std::collections::BTreeMap;

use contract_rig_core::AssertionError;
use serde_json::Value;

use crate::error::StepError;
use crate::http::RequestSpec;
use crate::matcher::Matcher;
use crate::placeholder::Rendering;
use crate::registry::RegistryError;
use crate::registry::StepCall;
use crate::registry::StepFuture;
use crate::registry::StepHandler;
use crate::registry::StepRegistry;
use crate::world::ScenarioWorld;

/// Builds a registry holding every built-in step.
///
/// # Errors
///
/// Returns [`RegistryError`] if a built-in pattern fails to compile.
pub fn default_registry() -> Result<StepRegistry, RegistryError> {
    let definitions: [(&str, StepHandler); 22] = [
        ("I am testing the {string} backend", select_backend),
        ("I use the token {string}", use_token),
        ("I set the header {string} to {string}", set_header),
        ("I send a {word} request to {string}", send_plain),
        ("I send a {word} request to {string} with body:", send_with_body),
        ("I send a {word} request to {string} with query parameters:", send_with_query),
        ("I send a {word} request to {string} with headers:", send_with_headers),
        ("the response status should be {int}", status_is),
        ("the response field {string} should be {string}", field_is),
        ("the response field {string} should match:", field_matches),
        ("the response field {string} should exist", field_exists),
        ("the response field {string} should not exist", field_absent),
        ("the response body should match:", body_matches),
        ("the response header {string} should be {string}", header_is),
        ("I store the response field {string} as {string}", store_field),
        ("I store the response body as {string}", store_body),
        ("the database is clean", truncate_all),
        ("the table {string} contains the rows:", insert_rows),
        ("the table {string} contains a row with:", insert_key_value_row),
        ("the table {string} should have {int} rows", table_count),
        ("the table {string} should have {int} row", table_count),
        ("the table {string} should contain a row with:", table_contains),
    ];
    let mut registry = StepRegistry::new();
    for (pattern, handler) in definitions {
        registry.register(pattern, handler)?;
    }
    Ok(registry)
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Step text with stored placeholders substituted.
fn plain(world: &mut ScenarioWorld, text: &str) -> String {
    world.variables.substitute(text, Rendering::Plain)
}

/// Reads a two-column `| key | value |` table, substituting values.
fn key_values(world: &mut ScenarioWorld, call: &StepCall) -> Result<BTreeMap<String, String>, StepError> {
    call.table()?
        .iter()
        .map(|row| match row.as_slice() {
            [key, value] => Ok((key.clone(), world.variables.substitute(value, Rendering::Plain))),
            _ => Err(StepError::invalid(format!(
                "`{}` expects two-column rows, got {} cells",
                call.text,
                row.len()
            ))),
        })
        .collect()
}

/// Request built from the captured method and path.
fn request(world: &mut ScenarioWorld, call: &StepCall) -> Result<RequestSpec, StepError> {
    Ok(RequestSpec {
        method: call.arg(0)?.to_string(),
        path: plain(world, call.arg(1)?),
        ..RequestSpec::default()
    })
}

/// Rejects negative counts.
fn not_negative(value: i64, what: &str) -> Result<u64, StepError> {
    u64::try_from(value).map_err(|_| StepError::invalid(format!("{what} cannot be negative")))
}

// ============================================================================
// SECTION: Target and Session
// ============================================================================

/// `I am testing the {string} backend`
fn select_backend<'a>(world: &'a mut ScenarioWorld, call: &'a StepCall) -> StepFuture<'a> {
    Box::pin(async move { world.select_target(call.arg(0)?) })
}

/// `I use the token {string}`
fn use_token<'a>(world: &'a mut ScenarioWorld, call: &'a StepCall) -> StepFuture<'a> {
    Box::pin(async move {
        let token = plain(world, call.arg(0)?);
        world.set_token(token);
        Ok(())
    })
}

/// `I set the header {string} to {string}`
fn set_header<'a>(world: &'a mut ScenarioWorld, call: &'a StepCall) -> StepFuture<'a> {
    Box::pin(async move {
        let value = plain(world, call.arg(1)?);
        world.set_header(call.arg(0)?.to_string(), value);
        Ok(())
    })
}

// ============================================================================
// SECTION: Requests
// ============================================================================

/// `I send a {word} request to {string}`
fn send_plain<'a>(world: &'a mut ScenarioWorld, call: &'a StepCall) -> StepFuture<'a> {
    Box::pin(async move {
        let spec = request(world, call)?;
        world.send(spec).await.map(|_| ())
    })
}

/// `... with body:` followed by a doc string.
fn send_with_body<'a>(world: &'a mut ScenarioWorld, call: &'a StepCall) -> StepFuture<'a> {
    Box::pin(async move {
        let mut spec = request(world, call)?;
        let body = world.variables.substitute(call.docstring()?, Rendering::Json);
        if let Err(err) = serde_json::from_str::<Value>(&body) {
            return Err(StepError::invalid(format!("request body is not valid JSON after substitution: {err}")));
        }
        spec.body = Some(body);
        world.send(spec).await.map(|_| ())
    })
}

/// `... with query parameters:` followed by a table.
fn send_with_query<'a>(world: &'a mut ScenarioWorld, call: &'a StepCall) -> StepFuture<'a> {
    Box::pin(async move {
        let mut spec = request(world, call)?;
        spec.query = key_values(world, call)?.into_iter().collect();
        world.send(spec).await.map(|_| ())
    })
}

/// `... with headers:` followed by a table.
fn send_with_headers<'a>(world: &'a mut ScenarioWorld, call: &'a StepCall) -> StepFuture<'a> {
    Box::pin(async move {
        let mut spec = request(world, call)?;
        spec.headers = key_values(world, call)?;
        world.send(spec).await.map(|_| ())
    })
}

// ============================================================================
// SECTION: Assertions
// ============================================================================

/// `the response status should be {int}`
fn status_is<'a>(world: &'a mut ScenarioWorld, call: &'a StepCall) -> StepFuture<'a> {
    Box::pin(async move {
        let expected = call.int(0)?;
        let actual = world.response()?.status;
        if i64::from(actual) == expected {
            return Ok(());
        }
        Err(AssertionError::new("status", expected.to_string(), actual.to_string()).into())
    })
}

/// `the response field {string} should be {string}`
fn field_is<'a>(world: &'a mut ScenarioWorld, call: &'a StepCall) -> StepFuture<'a> {
    Box::pin(async move {
        let path = plain(world, call.arg(0)?);
        let expected = plain(world, call.arg(1)?);
        let matcher = Matcher::parse(&expected)?;
        matcher.check(&path, world.response()?.field(&path)).map_err(StepError::from)
    })
}

/// `the response field {string} should match:` followed by a doc string.
fn field_matches<'a>(world: &'a mut ScenarioWorld, call: &'a StepCall) -> StepFuture<'a> {
    Box::pin(async move {
        let path = plain(world, call.arg(0)?);
        let expected = world.variables.substitute(call.docstring()?, Rendering::Json);
        let matcher = Matcher::parse(&expected)?;
        matcher.check(&path, world.response()?.field(&path)).map_err(StepError::from)
    })
}

/// `the response body should match:` followed by a doc string.
fn body_matches<'a>(world: &'a mut ScenarioWorld, call: &'a StepCall) -> StepFuture<'a> {
    Box::pin(async move {
        let expected = world.variables.substitute(call.docstring()?, Rendering::Json);
        let matcher = Matcher::parse(&expected)?;
        let body = world.response()?.body_value();
        matcher.check("", Some(&body)).map_err(StepError::from)
    })
}

/// `the response field {string} should exist`
fn field_exists<'a>(world: &'a mut ScenarioWorld, call: &'a StepCall) -> StepFuture<'a> {
    Box::pin(async move {
        let path = plain(world, call.arg(0)?);
        match world.response()?.field(&path) {
            Some(_) => Ok(()),
            None => Err(AssertionError::new(path, "<present>", "<absent>").into()),
        }
    })
}

/// `the response field {string} should not exist`
fn field_absent<'a>(world: &'a mut ScenarioWorld, call: &'a StepCall) -> StepFuture<'a> {
    Box::pin(async move {
        let path = plain(world, call.arg(0)?);
        match world.response()?.field(&path) {
            None => Ok(()),
            Some(value) => Err(AssertionError::new(path, "<absent>", value.to_string()).into()),
        }
    })
}

/// `the response header {string} should be {string}`
fn header_is<'a>(world: &'a mut ScenarioWorld, call: &'a StepCall) -> StepFuture<'a> {
    Box::pin(async move {
        let name = call.arg(0)?.to_ascii_lowercase();
        let expected = plain(world, call.arg(1)?);
        let matcher = Matcher::parse(&expected)?;
        let actual = world.response()?.headers.get(&name).cloned().map(Value::String);
        matcher.check(&format!("header {name}"), actual.as_ref()).map_err(StepError::from)
    })
}

// ============================================================================
// SECTION: Captures
// ============================================================================

/// `I store the response field {string} as {string}`
fn store_field<'a>(world: &'a mut ScenarioWorld, call: &'a StepCall) -> StepFuture<'a> {
    Box::pin(async move {
        let path = plain(world, call.arg(0)?);
        let name = call.arg(1)?;
        let value = world
            .response()?
            .field(&path)
            .cloned()
            .ok_or_else(|| AssertionError::new(path.clone(), "<present>", "<absent>"))?;
        world.variables.insert(name, value);
        Ok(())
    })
}

/// `I store the response body as {string}`
fn store_body<'a>(world: &'a mut ScenarioWorld, call: &'a StepCall) -> StepFuture<'a> {
    Box::pin(async move {
        let value = world.response()?.body_value();
        world.variables.insert(call.arg(0)?, value);
        Ok(())
    })
}

// ============================================================================
// SECTION: Fixtures
// ============================================================================

/// `the database is clean`
fn truncate_all<'a>(world: &'a mut ScenarioWorld, _call: &'a StepCall) -> StepFuture<'a> {
    Box::pin(async move {
        world.fixtures()?.truncate_all().await?;
        Ok(())
    })
}

/// `the table {string} contains the rows:` followed by a table.
fn insert_rows<'a>(world: &'a mut ScenarioWorld, call: &'a StepCall) -> StepFuture<'a> {
    Box::pin(async move {
        let table = call.arg(0)?;
        let Some((header, rows)) = call.table()?.split_first() else {
            return Err(StepError::invalid("table rows need a header row"));
        };
        let store = world.fixtures()?;
        for row in rows {
            if row.len() != header.len() {
                return Err(StepError::invalid(format!(
                    "row has {} cells, header has {}",
                    row.len(),
                    header.len()
                )));
            }
            let values: BTreeMap<String, String> = header
                .iter()
                .zip(row)
                .map(|(column, value)| (column.clone(), plain(world, value)))
                .collect();
            store.insert_row(table, &values).await?;
        }
        Ok(())
    })
}

/// `the table {string} contains a row with:` as key-value pairs.
fn insert_key_value_row<'a>(world: &'a mut ScenarioWorld, call: &'a StepCall) -> StepFuture<'a> {
    Box::pin(async move {
        let values = key_values(world, call)?;
        world.fixtures()?.insert_row(call.arg(0)?, &values).await?;
        Ok(())
    })
}

/// `the table {string} should have {int} rows`, singular or plural.
fn table_count<'a>(world: &'a mut ScenarioWorld, call: &'a StepCall) -> StepFuture<'a> {
    Box::pin(async move {
        let table = call.arg(0)?;
        let expected = not_negative(call.int(1)?, "row count")?;
        let actual = world.fixtures()?.count_rows(table).await?;
        if actual == expected {
            return Ok(());
        }
        Err(AssertionError::new(format!("table {table}"), format!("{expected} rows"), format!("{actual} rows"))
            .into())
    })
}

/// `the table {string} should contain a row with:` followed by a table.
fn table_contains<'a>(world: &'a mut ScenarioWorld, call: &'a StepCall) -> StepFuture<'a> {
    Box::pin(async move {
        let table = call.arg(0)?;
        let values = key_values(world, call)?;
        let matching = world.fixtures()?.count_matching(table, &values).await?;
        if matching > 0 {
            return Ok(());
        }
        let expected = values.iter().map(|(key, value)| format!("{key}={value}")).collect::<Vec<_>>();
        Err(AssertionError::new(format!("table {table}"), format!("a row with {}", expected.join(", ")), "no such row")
            .into())
    })
}
