use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use log::{debug, info, warn};
use rand::seq::SliceRandom;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::Semaphore;
use tokio::time::sleep;

use crate::bot::dedup::Normalizer;
use crate::storage::{AirtableError, MottoStorage, RandomFilter};
use crate::types::{Member, Motto, UserRef};

const API_BASE: &str = "https://api.airtable.com/v0";

// Admission gate for the remote store's rate limits: at most this many
// requests in flight, each slot pausing briefly after its request.
const CONCURRENT_REQUESTS: usize = 5;
const REQUEST_GAP: std::time::Duration = std::time::Duration::from_millis(200);

// The API caps batch deletes at 10 records per request.
const DELETE_BATCH: usize = 10;

#[derive(Debug, Deserialize)]
struct Record {
    id: String,
    #[serde(default)]
    fields: Value,
}

#[derive(Debug, Deserialize)]
struct RecordPage {
    #[serde(default)]
    records: Vec<Record>,
    offset: Option<String>,
}

/// Remote tabular store adapter for the Motto and Member tables.
pub struct AirtableStorage {
    client: Client,
    motto_url: String,
    member_url: String,
    api_key: String,
    bot_id: Option<String>,
    random_view: String,
    normalizer: Normalizer,
    gate: Semaphore,
}

impl AirtableStorage {
    pub fn new(
        base: &str,
        api_key: &str,
        bot_id: Option<String>,
        random_view: String,
    ) -> Result<Self> {
        Ok(Self {
            client: Client::new(),
            motto_url: format!("{}/{}/Motto", API_BASE, base),
            member_url: format!("{}/{}/Member", API_BASE, base),
            api_key: api_key.to_string(),
            bot_id,
            random_view,
            normalizer: Normalizer::new()?,
            gate: Semaphore::new(CONCURRENT_REQUESTS),
        })
    }

    /// Send one request through the admission gate. The permit is held for
    /// the request plus a fixed gap, keeping the overall rate within the
    /// store's limits; callers suspend while the gate is full.
    async fn call(&self, request: RequestBuilder) -> Result<Value> {
        let _permit = self.gate.acquire().await.context("storage gate closed")?;
        let response = request
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
            .context("remote store request failed")?;
        let status = response.status();
        let url = response.url().to_string();
        let body: Value = response.json().await.unwrap_or(Value::Null);
        sleep(REQUEST_GAP).await;
        if !status.is_success() {
            let error = &body["error"];
            return Err(AirtableError {
                status: status.as_u16(),
                url,
                kind: error["type"].as_str().unwrap_or("unknown").to_string(),
                message: error["message"].as_str().unwrap_or_default().to_string(),
            }
            .into());
        }
        Ok(body)
    }

    async fn list_page(
        &self,
        url: &str,
        formula: Option<&str>,
        view: Option<&str>,
        sort: Option<(&str, &str)>,
        offset: Option<&str>,
    ) -> Result<RecordPage> {
        let mut params: Vec<(String, String)> = Vec::new();
        if let Some(formula) = formula {
            params.push(("filterByFormula".to_string(), formula.to_string()));
        }
        if let Some(view) = view {
            params.push(("view".to_string(), view.to_string()));
        }
        if let Some((field, direction)) = sort {
            params.push(("sort[0][field]".to_string(), field.to_string()));
            params.push(("sort[0][direction]".to_string(), direction.to_string()));
        }
        if let Some(offset) = offset {
            params.push(("offset".to_string(), offset.to_string()));
        }
        let body = self.call(self.client.get(url).query(&params)).await?;
        serde_json::from_value(body).context("failed to decode record page")
    }

    /// Follow offset pagination, stopping early once `limit` records are in.
    async fn list_all(
        &self,
        url: &str,
        formula: Option<&str>,
        sort: Option<(&str, &str)>,
        limit: Option<usize>,
    ) -> Result<Vec<Record>> {
        let mut records = Vec::new();
        let mut offset: Option<String> = None;
        loop {
            let page = self
                .list_page(url, formula, None, sort, offset.as_deref())
                .await?;
            records.extend(page.records);
            if limit.is_some_and(|limit| records.len() >= limit) {
                records.truncate(limit.unwrap_or(records.len()));
                break;
            }
            match page.offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }
        Ok(records)
    }

    async fn insert(&self, url: &str, fields: Value) -> Result<Record> {
        let body = self
            .call(self.client.post(url).json(&json!({ "fields": fields })))
            .await?;
        serde_json::from_value(body).context("failed to decode inserted record")
    }

    async fn update(&self, url: &str, id: &str, fields: Value) -> Result<()> {
        self.call(
            self.client
                .patch(format!("{}/{}", url, id))
                .json(&json!({ "fields": fields })),
        )
        .await?;
        Ok(())
    }

    async fn delete_records(&self, url: &str, ids: &[String]) -> Result<()> {
        for batch in ids.chunks(DELETE_BATCH) {
            let request = if batch.len() == 1 {
                self.client.delete(format!("{}/{}", url, batch[0]))
            } else {
                let params: Vec<(String, String)> = batch
                    .iter()
                    .map(|id| ("records[]".to_string(), id.clone()))
                    .collect();
                self.client.delete(url).query(&params)
            };
            self.call(request).await?;
        }
        Ok(())
    }

    fn motto_fields(&self, motto: &Motto) -> Value {
        json!({
            "Motto": motto.motto,
            "Message ID": motto.message_id,
            "Date": motto.date.to_rfc3339(),
            "Member": motto.member.clone().map(|pk| vec![pk]).unwrap_or_default(),
            "Nominated By": motto.nominated_by.clone().map(|pk| vec![pk]).unwrap_or_default(),
            "Approved": motto.approved,
            "Bot ID": motto.bot_id.clone().or_else(|| self.bot_id.clone()).unwrap_or_default(),
        })
    }
}

fn field_str(fields: &Value, name: &str) -> String {
    fields[name].as_str().unwrap_or_default().to_string()
}

fn field_link(fields: &Value, name: &str) -> Option<String> {
    fields[name][0].as_str().map(String::from)
}

fn field_date(fields: &Value, name: &str) -> Option<DateTime<Utc>> {
    fields[name]
        .as_str()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|d| d.with_timezone(&Utc))
}

fn motto_from_record(record: &Record) -> Motto {
    let fields = &record.fields;
    Motto {
        primary_key: Some(record.id.clone()),
        motto: field_str(fields, "Motto"),
        message_id: field_str(fields, "Message ID"),
        date: field_date(fields, "Date").unwrap_or(DateTime::UNIX_EPOCH),
        member: field_link(fields, "Member"),
        nominated_by: field_link(fields, "Nominated By"),
        approved: fields["Approved"].as_bool().unwrap_or(false),
        approved_by_author: fields["Approved by Author"].as_bool().unwrap_or(false),
        bot_id: fields["Bot ID"].as_str().map(String::from),
    }
}

fn member_from_record(record: &Record) -> Member {
    let fields = &record.fields;
    Member {
        primary_key: record.id.clone(),
        username: field_str(fields, "Username"),
        emoji: fields["Emoji"].as_str().map(String::from),
        user_id: field_str(fields, "Discord ID"),
        support: fields["Support"].as_bool().unwrap_or(false),
        nickname: fields["Nickname"].as_str().map(String::from),
        use_nickname: fields["Use Nickname"].as_bool().unwrap_or(false),
        motto_count: fields["Motto Count"].as_u64().unwrap_or(0) as u32,
        bot_id: fields["Bot ID"].as_str().map(String::from),
        mottos: fields["Mottos"]
            .as_array()
            .map(|list| {
                list.iter()
                    .filter_map(|v| v.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default(),
    }
}

#[async_trait]
impl MottoStorage for AirtableStorage {
    async fn insert_motto(&self, motto: &Motto) -> Result<()> {
        let record = self.insert(&self.motto_url, self.motto_fields(motto)).await?;
        info!("Added motto from message ID {} as {}", motto.message_id, record.id);
        Ok(())
    }

    async fn update_motto_text(
        &self,
        primary_key: &str,
        text: &str,
        approved_by_author: bool,
    ) -> Result<()> {
        self.update(
            &self.motto_url,
            primary_key,
            json!({ "Motto": text, "Approved by Author": approved_by_author }),
        )
        .await?;
        info!("Updated motto {} with confirmed text", primary_key);
        Ok(())
    }

    async fn get_motto(&self, message_id: &str) -> Result<Option<Motto>> {
        let formula = format!("{{Message ID}}={}", message_id);
        let page = self
            .list_page(&self.motto_url, Some(formula.as_str()), None, None, None)
            .await?;
        Ok(page.records.first().map(motto_from_record))
    }

    async fn has_matching_motto(&self, cleaned: &str, message_id: Option<&str>) -> Result<bool> {
        let formula = self.normalizer.matching_formula(cleaned, message_id);
        debug!("Searching with filter {:?}", formula);
        let page = self
            .list_page(&self.motto_url, Some(formula.as_str()), None, None, None)
            .await?;
        Ok(!page.records.is_empty())
    }

    async fn get_random_motto(
        &self,
        filter: Option<&RandomFilter>,
    ) -> Result<Option<(Motto, Member)>> {
        let page = self
            .list_page(&self.motto_url, None, Some(self.random_view.as_str()), None, None)
            .await?;
        let candidates: Vec<Motto> = page
            .records
            .iter()
            .map(motto_from_record)
            .filter(|m| filter.map_or(true, |f| f.matches(&m.motto)))
            .collect();
        let Some(motto) = candidates.choose(&mut rand::thread_rng()).cloned() else {
            return Ok(None);
        };
        let Some(member_key) = motto.member.clone() else {
            warn!("Random motto {:?} has no member link", motto.primary_key);
            return Ok(None);
        };
        match self.get_member_by_key(&member_key).await? {
            Some(member) => Ok(Some((motto, member))),
            None => Ok(None),
        }
    }

    async fn delete_mottos(&self, primary_keys: &[String]) -> Result<()> {
        self.delete_records(&self.motto_url, primary_keys).await
    }

    async fn get_or_add_member(&self, user: &UserRef) -> Result<Member> {
        let formula = format!("{{Discord ID}}={}", user.id);
        let page = self
            .list_page(&self.member_url, Some(formula.as_str()), None, None, None)
            .await?;
        if let Some(record) = page.records.first() {
            return Ok(member_from_record(record));
        }
        let record = self
            .insert(
                &self.member_url,
                json!({
                    "Username": user.username,
                    "Discord ID": user.id,
                    "Bot ID": self.bot_id.clone().unwrap_or_default(),
                }),
            )
            .await?;
        debug!("Added member {} for user {}", record.id, user.id);
        Ok(member_from_record(&record))
    }

    async fn get_member_by_key(&self, primary_key: &str) -> Result<Option<Member>> {
        let body = self
            .call(self.client.get(format!("{}/{}", self.member_url, primary_key)))
            .await?;
        let record: Record = serde_json::from_value(body).context("failed to decode member")?;
        Ok(Some(member_from_record(&record)))
    }

    async fn get_member_by_user_id(&self, user_id: &str) -> Result<Option<Member>> {
        let formula = format!("{{Discord ID}}={}", user_id);
        let page = self
            .list_page(&self.member_url, Some(formula.as_str()), None, None, None)
            .await?;
        Ok(page.records.first().map(member_from_record))
    }

    async fn remove_all_data(&self, user_id: &str) -> Result<()> {
        let Some(member) = self.get_member_by_user_id(user_id).await? else {
            return Ok(());
        };
        info!("Removing {} motto(s) by {}", member.mottos.len(), member.username);
        self.delete_records(&self.motto_url, &member.mottos).await?;
        info!("Removing {} ({})", member.username, member.primary_key);
        self.delete_records(&self.member_url, std::slice::from_ref(&member.primary_key))
            .await
    }

    async fn set_nick_option(&self, user: &UserRef, on: bool) -> Result<()> {
        let member = self.get_or_add_member(user).await?;
        let mut fields = serde_json::Map::new();
        fields.insert("Use Nickname".to_string(), json!(on));
        if !on {
            fields.insert("Nickname".to_string(), Value::Null);
        }
        debug!("Recording nickname option for {}: {:?}", user.id, fields);
        self.update(&self.member_url, &member.primary_key, Value::Object(fields))
            .await
    }

    async fn update_name(&self, member: &Member, user: &UserRef) -> Result<()> {
        let mut fields = serde_json::Map::new();
        if member.username != user.username {
            fields.insert("Username".to_string(), json!(user.username));
        }
        if member.use_nickname {
            let platform_nickname = user.preferred_name();
            if member.nickname.as_deref() != Some(platform_nickname)
                && platform_nickname != member.username
            {
                fields.insert("Nickname".to_string(), json!(platform_nickname));
            }
        } else if member.nickname.as_deref().is_some_and(|n| !n.is_empty()) {
            fields.insert("Nickname".to_string(), json!(""));
        }
        if fields.is_empty() {
            return Ok(());
        }
        debug!("Recording name changes for {}: {:?}", user.id, fields);
        self.update(&self.member_url, &member.primary_key, Value::Object(fields))
            .await
    }

    async fn update_emoji(&self, member: &Member, emoji: &str) -> Result<()> {
        if member.emoji.as_deref().unwrap_or_default() == emoji {
            return Ok(());
        }
        debug!("Updating member {} emoji to {:?}", member.primary_key, emoji);
        self.update(&self.member_url, &member.primary_key, json!({ "Emoji": emoji }))
            .await
    }

    async fn get_support_members(&self) -> Result<Vec<Member>> {
        let records = self
            .list_all(
                &self.member_url,
                Some("{Support}=TRUE()"),
                Some(("Username", "asc")),
                None,
            )
            .await?;
        Ok(records.iter().map(member_from_record).collect())
    }

    async fn get_leaders(&self, count: usize) -> Result<Vec<Member>> {
        let records = self
            .list_all(
                &self.member_url,
                Some("{Motto Count}>0"),
                Some(("Motto Count", "desc")),
                Some(count),
            )
            .await?;
        Ok(records.iter().map(member_from_record).collect())
    }

    async fn remove_unapproved_mottos(&self, retention_hours: i64) -> Result<()> {
        let records = self
            .list_all(&self.motto_url, Some("NOT({Motto})"), None, None)
            .await?;
        let expiry = Utc::now() - Duration::hours(retention_hours);
        let expired: Vec<String> = records
            .iter()
            .filter(|record| field_date(&record.fields, "Date").is_some_and(|date| date < expiry))
            .map(|record| record.id.clone())
            .collect();
        if expired.is_empty() {
            return Ok(());
        }
        debug!("Deleting {} unconfirmed motto(s)", expired.len());
        self.delete_records(&self.motto_url, &expired).await?;
        info!("Deleted {} unconfirmed motto(s)", expired.len());
        Ok(())
    }
}
