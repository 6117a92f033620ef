// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Route 53 implementation of the DNS provider port.
//!
//! A thin adapter over `aws-sdk-route53`: the hosted zone is resolved
//! once at construction and must match the configured `DOMAIN`, list
//! calls follow `is_truncated`/`next_record_name` to exhaustion, and SDK
//! failures are folded into the [`ProviderError`] taxonomy. Throttling
//! retries happen inside the SDK (`AWS_RETRY` attempts).

use async_trait::async_trait;
use aws_config::retry::RetryConfig;
use aws_config::BehaviorVersion;
use aws_sdk_route53::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_route53::types::{
    Change as SdkChange, ChangeAction as SdkChangeAction, ChangeBatch, ResourceRecord,
    ResourceRecordSet, RrType,
};
use aws_sdk_route53::Client;
use tracing::{debug, info};

use crate::config::Settings;
use crate::names::trim_trailing_dot;
use crate::records::RecordKind;

use super::{Change, ChangeAction, DnsProvider, ProviderError, RecordSet, ZoneInfo};

/// DNS provider over AWS Route 53.
#[derive(Clone)]
pub struct Route53Provider {
    client: Client,
    zone: ZoneInfo,
}

impl Route53Provider {
    /// Build the SDK client and resolve the hosted zone.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Credentials`] on auth failures and
    /// [`ProviderError::Other`] when the zone cannot be resolved or its
    /// name does not match the configured domain; the caller refuses to
    /// start in either case.
    pub async fn connect(settings: &Settings) -> Result<Self, ProviderError> {
        let retry = RetryConfig::standard().with_max_attempts(settings.aws_retry);

        let mut config = aws_config::defaults(BehaviorVersion::latest())
            .retry_config(retry.clone())
            .load()
            .await;

        if let Some(role_arn) = &settings.aws_assume_role {
            let assumed = aws_config::sts::AssumeRoleProvider::builder(role_arn)
                .session_name("sublet")
                .configure(&config)
                .build()
                .await;
            config = aws_config::defaults(BehaviorVersion::latest())
                .retry_config(retry)
                .credentials_provider(assumed)
                .load()
                .await;
        }

        let client = Client::new(&config);

        let output = client
            .get_hosted_zone()
            .id(&settings.aws_hosted_zone_id)
            .send()
            .await
            .map_err(map_sdk_error)?;

        let hosted = output
            .hosted_zone()
            .ok_or_else(|| ProviderError::Other("hosted zone missing from response".to_string()))?;

        let name = trim_trailing_dot(hosted.name()).to_string();
        if name != settings.domain {
            return Err(ProviderError::Other(format!(
                "domain {} does not match hosted zone {name}",
                settings.domain
            )));
        }

        info!(zone = %name, id = %hosted.id(), "resolved hosted zone");

        Ok(Self {
            client,
            zone: ZoneInfo {
                name,
                id: hosted.id().to_string(),
            },
        })
    }
}

#[async_trait]
impl DnsProvider for Route53Provider {
    fn zone(&self) -> &ZoneInfo {
        &self.zone
    }

    async fn list_record_sets(
        &self,
        start_name: Option<&str>,
        start_kind: Option<RecordKind>,
    ) -> Result<Vec<RecordSet>, ProviderError> {
        let mut output = Vec::new();
        let mut next_name = start_name.map(str::to_string);
        let mut next_kind = start_kind.map(|k| RrType::from(k.as_str()));

        loop {
            let page = self
                .client
                .list_resource_record_sets()
                .hosted_zone_id(&self.zone.id)
                .set_start_record_name(next_name.take())
                .set_start_record_type(next_kind.take())
                .send()
                .await
                .map_err(map_sdk_error)?;

            for set in page.resource_record_sets() {
                let Some(kind) = RecordKind::parse(set.r#type().as_str()) else {
                    continue;
                };
                output.push(RecordSet {
                    name: set.name().to_string(),
                    kind,
                    ttl: set.ttl().unwrap_or_default(),
                    values: set
                        .resource_records()
                        .iter()
                        .map(|record| record.value().to_string())
                        .collect(),
                });
            }

            if !page.is_truncated() {
                break;
            }
            next_name = page.next_record_name().map(str::to_string);
            next_kind = page.next_record_type().cloned();
        }

        Ok(output)
    }

    async fn apply_changes(&self, changes: Vec<Change>) -> Result<(), ProviderError> {
        if changes.is_empty() {
            return Ok(());
        }

        debug!(count = changes.len(), "submitting change batch");

        let mut sdk_changes = Vec::with_capacity(changes.len());
        for change in &changes {
            let mut set = ResourceRecordSet::builder()
                .name(&change.name)
                .r#type(RrType::from(change.kind.as_str()))
                .ttl(change.ttl);
            for value in &change.values {
                set = set.resource_records(
                    ResourceRecord::builder()
                        .value(value)
                        .build()
                        .map_err(|e| ProviderError::InvalidChange(e.to_string()))?,
                );
            }
            sdk_changes.push(
                SdkChange::builder()
                    .action(match change.action {
                        ChangeAction::Upsert => SdkChangeAction::Upsert,
                        ChangeAction::Delete => SdkChangeAction::Delete,
                    })
                    .resource_record_set(
                        set.build()
                            .map_err(|e| ProviderError::InvalidChange(e.to_string()))?,
                    )
                    .build()
                    .map_err(|e| ProviderError::InvalidChange(e.to_string()))?,
            );
        }

        let batch = ChangeBatch::builder()
            .set_changes(Some(sdk_changes))
            .build()
            .map_err(|e| ProviderError::InvalidChange(e.to_string()))?;

        self.client
            .change_resource_record_sets()
            .hosted_zone_id(&self.zone.id)
            .change_batch(batch)
            .send()
            .await
            .map_err(map_sdk_error)?;

        Ok(())
    }
}

/// Fold an SDK failure into the provider error taxonomy.
fn map_sdk_error<E>(err: SdkError<E>) -> ProviderError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    match &err {
        SdkError::ServiceError(service) => {
            let code = service.err().code().unwrap_or_default();
            let message = service.err().message().unwrap_or_default().to_string();
            match code {
                "Throttling" | "ThrottlingException" | "PriorRequestNotComplete" => {
                    ProviderError::Throttled(message)
                }
                "AccessDenied"
                | "AccessDeniedException"
                | "InvalidClientTokenId"
                | "UnrecognizedClientException"
                | "SignatureDoesNotMatch"
                | "ExpiredToken" => ProviderError::Credentials(message),
                "InvalidChangeBatch" | "InvalidInput" => {
                    // A DELETE of a record that is already absent comes
                    // back as an InvalidChangeBatch naming the record.
                    if message.contains("not found") || message.contains("does not exist") {
                        ProviderError::Gone(message)
                    } else {
                        ProviderError::InvalidChange(message)
                    }
                }
                _ => ProviderError::Other(format!("{code}: {message}")),
            }
        }
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) => {
            ProviderError::Throttled(err.to_string())
        }
        _ => ProviderError::Other(err.to_string()),
    }
}

