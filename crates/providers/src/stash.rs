//! GraphQL client for the Stash media-library server.

use crate::{
    FindFilter, Job, LibraryRoot, LibraryServer, ProviderError, Scene, SceneFilter, Tag,
};
use bytes::Bytes;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

const SCENE_FIELDS: &str = "id organized files { path size } tags { id name }";

#[derive(Clone)]
pub struct StashConfig {
    pub base_url: String,
    pub api_key: String,
    pub accept_invalid_certs: bool,
}

#[derive(Clone)]
pub struct StashClient {
    client: Client,
    cfg: Arc<StashConfig>,
}

#[derive(Serialize)]
struct GraphQlRequest<'a> {
    #[serde(rename = "operationName")]
    operation_name: &'a str,
    query: &'a str,
    variables: Value,
}

#[derive(Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Deserialize)]
struct GraphQlError {
    message: String,
}

impl StashClient {
    pub fn new(cfg: StashConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .danger_accept_invalid_certs(cfg.accept_invalid_certs)
            .build()
            .map_err(|e| ProviderError::RequestFailed(e.to_string()))?;
        Ok(Self {
            client,
            cfg: Arc::new(cfg),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/graphql", self.cfg.base_url.trim_end_matches('/'))
    }

    async fn call<T: DeserializeOwned>(
        &self,
        operation_name: &str,
        query: &str,
        variables: Value,
    ) -> Result<T, ProviderError> {
        debug!(operation = operation_name, "stash graphql call");
        let body = GraphQlRequest {
            operation_name,
            query,
            variables,
        };
        let resp = self
            .client
            .post(self.endpoint())
            .header("ApiKey", &self.cfg.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::RequestFailed(e.to_string()))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.bytes().await.unwrap_or(Bytes::from_static(b""));
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }
        let parsed: GraphQlResponse<T> = resp
            .json()
            .await
            .map_err(|e| ProviderError::RequestFailed(e.to_string()))?;
        decode_response(operation_name, parsed)
    }
}

fn decode_response<T>(operation_name: &str, parsed: GraphQlResponse<T>) -> Result<T, ProviderError> {
    if !parsed.errors.is_empty() {
        return Err(ProviderError::GraphQl(
            parsed.errors.into_iter().map(|e| e.message).collect(),
        ));
    }
    parsed
        .data
        .ok_or_else(|| ProviderError::MissingData(format!("{operation_name}.data")))
}

/// The server's name filter is case-insensitive; only an exact match counts.
fn pick_tag(tags: Vec<Tag>, name: &str) -> Option<Tag> {
    tags.into_iter().find(|t| t.name == name)
}

#[async_trait::async_trait]
impl LibraryServer for StashClient {
    async fn library_roots(&self) -> Result<Vec<LibraryRoot>, ProviderError> {
        #[derive(Deserialize)]
        struct Data {
            configuration: Configuration,
        }
        #[derive(Deserialize)]
        struct Configuration {
            general: General,
        }
        #[derive(Deserialize)]
        struct General {
            stashes: Vec<LibraryRoot>,
        }

        let data: Data = self
            .call(
                "Configuration",
                "query Configuration { configuration { general { stashes { path excludeVideo excludeImage } } } }",
                json!({}),
            )
            .await?;
        Ok(data.configuration.general.stashes)
    }

    async fn metadata_scan(&self, paths: &[String]) -> Result<String, ProviderError> {
        #[derive(Deserialize)]
        struct Data {
            #[serde(rename = "metadataScan")]
            metadata_scan: String,
        }

        let data: Data = self
            .call(
                "MetadataScan",
                "mutation MetadataScan($input: ScanMetadataInput!) { metadataScan(input: $input) }",
                json!({ "input": { "paths": paths } }),
            )
            .await?;
        Ok(data.metadata_scan)
    }

    async fn find_job(&self, job_id: &str) -> Result<Option<Job>, ProviderError> {
        #[derive(Deserialize)]
        struct Data {
            #[serde(rename = "findJob")]
            find_job: Option<Job>,
        }

        let data: Data = self
            .call(
                "FindJob",
                "query FindJob($input: FindJobInput!) { findJob(input: $input) { id status progress description } }",
                json!({ "input": { "id": job_id } }),
            )
            .await?;
        Ok(data.find_job)
    }

    async fn find_scenes(
        &self,
        scene_filter: SceneFilter,
        filter: FindFilter,
    ) -> Result<Vec<Scene>, ProviderError> {
        #[derive(Deserialize)]
        struct Data {
            #[serde(rename = "findScenes")]
            find_scenes: FindScenes,
        }
        #[derive(Deserialize)]
        struct FindScenes {
            scenes: Vec<Scene>,
        }

        let query = format!(
            "query FindScenes($filter: FindFilterType, $scene_filter: SceneFilterType) {{ findScenes(filter: $filter, scene_filter: $scene_filter) {{ count scenes {{ {SCENE_FIELDS} }} }} }}"
        );
        let data: Data = self
            .call(
                "FindScenes",
                &query,
                json!({ "filter": filter, "scene_filter": scene_filter }),
            )
            .await?;
        Ok(data.find_scenes.scenes)
    }

    async fn find_duplicate_scenes(
        &self,
        distance: i64,
        duration_diff: f64,
    ) -> Result<Vec<Vec<Scene>>, ProviderError> {
        #[derive(Deserialize)]
        struct Data {
            #[serde(rename = "findDuplicateScenes")]
            groups: Vec<Vec<Scene>>,
        }

        let query = format!(
            "query FindDuplicateScenes($distance: Int, $duration_diff: Float) {{ findDuplicateScenes(distance: $distance, duration_diff: $duration_diff) {{ {SCENE_FIELDS} }} }}"
        );
        let data: Data = self
            .call(
                "FindDuplicateScenes",
                &query,
                json!({ "distance": distance, "duration_diff": duration_diff }),
            )
            .await?;
        Ok(data.groups)
    }

    async fn destroy_scenes(&self, ids: &[String]) -> Result<(), ProviderError> {
        let _: Value = self
            .call(
                "ScenesDestroy",
                "mutation ScenesDestroy($ids: [ID!]!, $delete_file: Boolean, $delete_generated: Boolean) { scenesDestroy(input: {ids: $ids, delete_file: $delete_file, delete_generated: $delete_generated}) }",
                json!({ "ids": ids, "delete_file": true, "delete_generated": true }),
            )
            .await?;
        Ok(())
    }

    async fn identify(
        &self,
        scene_ids: &[String],
        stash_box_endpoint: &str,
    ) -> Result<String, ProviderError> {
        #[derive(Deserialize)]
        struct Data {
            #[serde(rename = "metadataIdentify")]
            metadata_identify: String,
        }

        let data: Data = self
            .call(
                "MetadataIdentify",
                "mutation MetadataIdentify($input: IdentifyMetadataInput!) { metadataIdentify(input: $input) }",
                json!({
                    "input": {
                        "sceneIDs": scene_ids,
                        "sources": [{ "source": { "stash_box_endpoint": stash_box_endpoint } }],
                    }
                }),
            )
            .await?;
        Ok(data.metadata_identify)
    }

    async fn find_tag_by_name(&self, name: &str) -> Result<Option<Tag>, ProviderError> {
        #[derive(Deserialize)]
        struct Data {
            #[serde(rename = "findTags")]
            find_tags: FindTags,
        }
        #[derive(Deserialize)]
        struct FindTags {
            tags: Vec<Tag>,
        }

        let data: Data = self
            .call(
                "FindTags",
                "query FindTags($filter: FindFilterType, $tag_filter: TagFilterType) { findTags(filter: $filter, tag_filter: $tag_filter) { tags { id name } } }",
                json!({
                    "filter": FindFilter::all(),
                    "tag_filter": { "name": { "value": name, "modifier": "EQUALS" } },
                }),
            )
            .await?;
        Ok(pick_tag(data.find_tags.tags, name))
    }

    async fn add_tags_to_scenes(
        &self,
        scene_ids: &[String],
        tag_ids: &[String],
    ) -> Result<(), ProviderError> {
        let _: Value = self
            .call(
                "BulkSceneUpdate",
                "mutation BulkSceneUpdate($input: BulkSceneUpdateInput!) { bulkSceneUpdate(input: $input) { id } }",
                json!({
                    "input": {
                        "ids": scene_ids,
                        "tag_ids": { "mode": "ADD", "ids": tag_ids },
                    }
                }),
            )
            .await?;
        Ok(())
    }

    async fn run_plugin_task(
        &self,
        plugin_id: &str,
        task_name: &str,
    ) -> Result<String, ProviderError> {
        #[derive(Deserialize)]
        struct Data {
            #[serde(rename = "runPluginTask")]
            run_plugin_task: String,
        }

        let data: Data = self
            .call(
                "RunPluginTask",
                "mutation RunPluginTask($plugin_id: ID!, $task_name: String) { runPluginTask(plugin_id: $plugin_id, task_name: $task_name) }",
                json!({ "plugin_id": plugin_id, "task_name": task_name }),
            )
            .await?;
        Ok(data.run_plugin_task)
    }

    async fn metadata_generate(&self) -> Result<String, ProviderError> {
        #[derive(Deserialize)]
        struct Defaults {
            configuration: DefaultsConfiguration,
        }
        #[derive(Deserialize)]
        struct DefaultsConfiguration {
            defaults: DefaultSettings,
        }
        #[derive(Deserialize)]
        struct DefaultSettings {
            #[serde(default)]
            generate: Option<Value>,
        }
        #[derive(Deserialize)]
        struct Data {
            #[serde(rename = "metadataGenerate")]
            metadata_generate: String,
        }

        let defaults: Defaults = self
            .call(
                "GenerateDefaults",
                "query GenerateDefaults { configuration { defaults { generate { covers sprites previews imagePreviews markers markerImagePreviews markerScreenshots transcodes phashes interactiveHeatmapsSpeeds clipPreviews imageThumbnails previewOptions { previewSegments previewSegmentDuration previewExcludeStart previewExcludeEnd previewPreset } } } } }",
                json!({}),
            )
            .await?;
        let input = generate_input(defaults.configuration.defaults.generate);
        let data: Data = self
            .call(
                "MetadataGenerate",
                "mutation MetadataGenerate($input: GenerateMetadataInput!) { metadataGenerate(input: $input) }",
                json!({ "input": input }),
            )
            .await?;
        Ok(data.metadata_generate)
    }
}

/// Builds a `GenerateMetadataInput` from the server's configured defaults,
/// never overwriting media that already exists.
fn generate_input(defaults: Option<Value>) -> Value {
    let mut input = match defaults {
        Some(Value::Object(map)) => Value::Object(map),
        _ => json!({}),
    };
    if let Some(map) = input.as_object_mut() {
        map.insert("overwrite".into(), Value::Bool(false));
    }
    input
}
