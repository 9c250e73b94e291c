use std::sync::Arc;

use futures::{future::BoxFuture, try_join};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use tracing::debug;
use uuid::Uuid;

use crate::dao::{
    models::{
        AdvanceOutcomeEntity, AdvanceRequestEntity, CleanupSummaryEntity, NewSuggestionEntity,
        NewVoteEntity, ParticipantEntity, ProbeEntity, RoundEntity, SuggestionEntity,
        TableEntity, TableSnapshotEntity, VoteEntity, VoteInsertEntity,
    },
    round_store::RoundStore,
    storage::StorageResult,
};

use super::{
    config::RestConfig,
    error::{RestDaoError, RestResult},
    models::{
        AdvanceRoundArgs, ApiErrorBody, PARTICIPANTS, ROUNDS, RPC_ADVANCE_ROUND,
        RPC_EXPIRE_ROUNDS, RPC_RECOVER_STUCK_TABLES, RPC_SERVER_TIME, SUGGESTIONS, TABLES, VOTES,
    },
};

const API_PREFIX: &str = "rest/v1";

/// Round store backed by a PostgREST-style HTTP API.
#[derive(Clone)]
pub struct RestRoundStore {
    client: Client,
    base_url: Arc<str>,
    api_key: Option<Arc<str>>,
}

impl RestRoundStore {
    /// Build the HTTP client and check that the store answers.
    pub async fn connect(config: RestConfig) -> RestResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|source| RestDaoError::ClientBuilder { source })?;

        let store = Self {
            client,
            base_url: Arc::<str>::from(config.base_url.trim_end_matches('/')),
            api_key: config.api_key.map(Arc::<str>::from),
        };

        store.server_time().await?;
        Ok(store)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/{}/{}", self.base_url, API_PREFIX, path);
        let builder = self
            .client
            .request(method, url)
            .header("Accept", "application/json");
        match self.api_key {
            Some(ref key) => builder
                .header("apikey", key.as_ref())
                .bearer_auth(key.as_ref()),
            None => builder,
        }
    }

    async fn send(&self, path: &str, builder: RequestBuilder) -> RestResult<Response> {
        builder
            .send()
            .await
            .map_err(|source| RestDaoError::RequestSend {
                path: path.to_string(),
                source,
            })
    }

    async fn decode<T>(path: &str, response: Response) -> RestResult<T>
    where
        T: DeserializeOwned,
    {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RestDaoError::RequestStatus {
                path: path.to_string(),
                status,
                message: ApiErrorBody::parse(&body).describe(status),
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|source| RestDaoError::DecodeResponse {
                path: path.to_string(),
                source,
            })
    }

    async fn select<T>(&self, table: &str, query: &[(&str, String)]) -> RestResult<Vec<T>>
    where
        T: DeserializeOwned,
    {
        let builder = self.request(Method::GET, table).query(query);
        let response = self.send(table, builder).await?;
        Self::decode(table, response).await
    }

    async fn rpc<A, T>(&self, function: &str, args: &A) -> RestResult<T>
    where
        A: ?Sized + Serialize,
        T: DeserializeOwned,
    {
        let builder = self.request(Method::POST, function).json(args);
        let response = self.send(function, builder).await?;
        Self::decode(function, response).await
    }

    async fn insert<B, T>(&self, table: &str, body: &B) -> RestResult<T>
    where
        B: ?Sized + Serialize,
        T: DeserializeOwned,
    {
        let builder = self
            .request(Method::POST, table)
            .header("Prefer", "return=representation")
            .json(body);
        let response = self.send(table, builder).await?;
        let mut rows: Vec<T> = Self::decode(table, response).await?;
        if rows.is_empty() {
            return Err(RestDaoError::EmptyRepresentation {
                path: table.to_string(),
            });
        }
        Ok(rows.swap_remove(0))
    }

    async fn server_time(&self) -> RestResult<ProbeEntity> {
        self.rpc(RPC_SERVER_TIME, &serde_json::json!({})).await
    }

    async fn snapshot(&self, table_id: Uuid) -> RestResult<Option<TableSnapshotEntity>> {
        let mut tables: Vec<TableEntity> = self
            .select(TABLES, &[("id", format!("eq.{table_id}")), ("limit", "1".into())])
            .await?;
        let Some(table) = tables.pop() else {
            return Ok(None);
        };

        let mut rounds: Vec<RoundEntity> = self
            .select(
                ROUNDS,
                &[
                    ("table_id", format!("eq.{table_id}")),
                    ("order", "sequence.desc".into()),
                    ("limit", "1".into()),
                ],
            )
            .await?;
        let round = rounds.pop();

        let participants_query = [
            ("table_id", format!("eq.{table_id}")),
            ("order", "joined_at.asc".into()),
        ];
        let participants = self.select::<ParticipantEntity>(PARTICIPANTS, &participants_query);

        let (suggestions, votes, participants) = match &round {
            Some(round) => {
                let suggestions_query = [
                    ("round_id", format!("eq.{}", round.id)),
                    ("order", "created_at.asc".into()),
                ];
                let votes_query = suggestions_query.clone();
                try_join!(
                    self.select::<SuggestionEntity>(SUGGESTIONS, &suggestions_query),
                    self.select::<VoteEntity>(VOTES, &votes_query),
                    participants,
                )?
            }
            None => (Vec::new(), Vec::new(), participants.await?),
        };

        Ok(Some(TableSnapshotEntity {
            table,
            round,
            suggestions,
            votes,
            participants,
        }))
    }

    async fn vote(&self, vote: NewVoteEntity) -> RestResult<VoteInsertEntity> {
        let builder = self
            .request(Method::POST, VOTES)
            .header("Prefer", "return=representation")
            .json(&vote);
        let response = self.send(VOTES, builder).await?;

        if response.status() == StatusCode::CONFLICT {
            let body = ApiErrorBody::parse(&response.text().await.unwrap_or_default());
            debug!(
                round_id = %vote.round_id,
                unique_violation = body.is_unique_violation(),
                "vote insert conflicted; treating as already voted"
            );
            return Ok(VoteInsertEntity::Duplicate);
        }

        let mut rows: Vec<VoteEntity> = Self::decode(VOTES, response).await?;
        if rows.is_empty() {
            return Err(RestDaoError::EmptyRepresentation {
                path: VOTES.to_string(),
            });
        }
        Ok(VoteInsertEntity::Inserted(rows.swap_remove(0)))
    }
}

impl RoundStore for RestRoundStore {
    fn fetch_table(
        &self,
        table_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<TableSnapshotEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.snapshot(table_id).await.map_err(Into::into) })
    }

    fn insert_suggestion(
        &self,
        suggestion: NewSuggestionEntity,
    ) -> BoxFuture<'static, StorageResult<SuggestionEntity>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .insert::<_, SuggestionEntity>(SUGGESTIONS, &suggestion)
                .await
                .map_err(Into::into)
        })
    }

    fn insert_vote(&self, vote: NewVoteEntity) -> BoxFuture<'static, StorageResult<VoteInsertEntity>> {
        let store = self.clone();
        Box::pin(async move { store.vote(vote).await.map_err(Into::into) })
    }

    fn advance_round(
        &self,
        request: AdvanceRequestEntity,
    ) -> BoxFuture<'static, StorageResult<AdvanceOutcomeEntity>> {
        let store = self.clone();
        Box::pin(async move {
            let args = AdvanceRoundArgs::from(request);
            store
                .rpc::<_, AdvanceOutcomeEntity>(RPC_ADVANCE_ROUND, &args)
                .await
                .map_err(Into::into)
        })
    }

    fn expire_rounds(&self) -> BoxFuture<'static, StorageResult<CleanupSummaryEntity>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .rpc::<_, CleanupSummaryEntity>(RPC_EXPIRE_ROUNDS, &serde_json::json!({}))
                .await
                .map_err(Into::into)
        })
    }

    fn recover_stuck_tables(&self) -> BoxFuture<'static, StorageResult<CleanupSummaryEntity>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .rpc::<_, CleanupSummaryEntity>(RPC_RECOVER_STUCK_TABLES, &serde_json::json!({}))
                .await
                .map_err(Into::into)
        })
    }

    fn probe(&self) -> BoxFuture<'static, StorageResult<ProbeEntity>> {
        let store = self.clone();
        Box::pin(async move { store.server_time().await.map_err(Into::into) })
    }
}
