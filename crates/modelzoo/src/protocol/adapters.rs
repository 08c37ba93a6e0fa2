//! Per-protocol request/response adapters.
//!
//! Request adapters are plain pure functions: `(payload, target_url) ->
//! payload'`. Response adapters additionally need a client to poll the
//! backend (sd-server's task-queue protocol), so they're async and take a
//! `&reqwest::Client`; all of them still only observe the response body
//! they're handed plus the target URL, never hidden state.

use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use tokio::time::sleep;

use crate::error::{ModelZooError, Result};

pub type RequestAdapter = fn(Value, &str) -> Value;

pub type ResponseAdapter = for<'a> fn(
    Value,
    &'a str,
    &'a reqwest::Client,
) -> Pin<Box<dyn Future<Output = Result<Value>> + Send + 'a>>;

/// Upper bound on how long the sd-server task-polling adapter will wait for
/// a `Done` status before giving up, surfacing a transport error instead of
/// blocking the request task indefinitely.
pub const SD_SERVER_POLL_TIMEOUT: Duration = Duration::from_secs(300);

/// DALL-E style `txt2img` request shaping: `batch_count -> n`, `steps ->
/// quality` (`>1` => `"hd"`, else `"standard"`), `width`x`height -> size`,
/// `sampler_name -> style`, and a forced `response_format: b64_json`. Only
/// `prompt` plus the mapped fields survive — everything else is dropped.
pub fn dalle_txt2img_request_adapter(mut data: Value, _target_url: &str) -> Value {
    let obj = data.as_object_mut();
    let mut adapted = serde_json::Map::new();

    let prompt = obj
        .as_ref()
        .and_then(|o| o.get("prompt"))
        .cloned()
        .unwrap_or(Value::Null);
    adapted.insert("prompt".to_string(), prompt);
    adapted.insert("response_format".to_string(), json!("b64_json"));

    if let Some(obj) = obj {
        if let Some(n) = obj.remove("batch_count") {
            adapted.insert("n".to_string(), n);
        }
        if let Some(steps) = obj.remove("steps") {
            let quality = steps.as_f64().map(|s| s > 1.0).unwrap_or(false);
            adapted.insert(
                "quality".to_string(),
                json!(if quality { "hd" } else { "standard" }),
            );
        }
        let width = obj.remove("width");
        let height = obj.remove("height");
        if let (Some(w), Some(h)) = (width, height) {
            adapted.insert("size".to_string(), json!(format!("{w}x{h}")));
        }
        if let Some(sampler) = obj.remove("sampler_name") {
            adapted.insert("style".to_string(), sampler);
        }
    }

    Value::Object(adapted)
}

/// `{data:[{b64_json}...]}` -> `{images:[b64...]}`, the public-facing image
/// list shape every backend protocol must converge on.
pub fn dalle_txt2img_response_adapter<'a>(
    response_data: Value,
    _target_url: &'a str,
    _client: &'a reqwest::Client,
) -> Pin<Box<dyn Future<Output = Result<Value>> + Send + 'a>> {
    Box::pin(async move {
        let images: Vec<Value> = response_data
            .get("data")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item.get("b64_json").cloned())
                    .collect()
            })
            .unwrap_or_default();
        Ok(json!({ "images": images }))
    })
}

/// sd-server drops `model` and renames `sampler_name -> sample_method`,
/// `steps -> sample_steps`; everything else (prompt, cfg_scale, ...) passes
/// through untouched.
pub fn sd_server_txt2img_request_adapter(mut data: Value, _target_url: &str) -> Value {
    if let Some(obj) = data.as_object_mut() {
        obj.remove("model");
        if let Some(sampler) = obj.remove("sampler_name") {
            obj.insert("sample_method".to_string(), sampler);
        }
        if let Some(steps) = obj.remove("steps") {
            obj.insert("sample_steps".to_string(), steps);
        }
    }
    data
}

/// sd-server responds to a submitted `txt2img` with `{task_id}` and
/// completes the job asynchronously; this adapter polls `.../result?task_id=`
/// at 1 Hz until `status == "Done"`, bounded by [`SD_SERVER_POLL_TIMEOUT`].
pub fn sd_server_txt2img_response_adapter<'a>(
    response_data: Value,
    target_url: &'a str,
    client: &'a reqwest::Client,
) -> Pin<Box<dyn Future<Output = Result<Value>> + Send + 'a>> {
    Box::pin(async move {
        let task_id = response_data
            .get("task_id")
            .ok_or_else(|| ModelZooError::Transport("task_id was not returned by server".into()))?
            .clone();

        let result_url = target_url.replacen("txt2img", "result", 1);
        let started = Instant::now();

        loop {
            if started.elapsed() > SD_SERVER_POLL_TIMEOUT {
                return Err(ModelZooError::Transport(format!(
                    "sd-server task {task_id} did not finish within {:?}",
                    SD_SERVER_POLL_TIMEOUT
                )));
            }

            sleep(Duration::from_secs(1)).await;

            let resp = client
                .get(&result_url)
                .query(&[("task_id", task_id.to_string().trim_matches('"'))])
                .send()
                .await
                .map_err(|e| ModelZooError::Transport(e.to_string()))?;
            let body: Value = resp
                .json()
                .await
                .map_err(|e| ModelZooError::Transport(e.to_string()))?;

            if body.get("status").and_then(Value::as_str) == Some("Done") {
                let images: Vec<Value> = body
                    .get("data")
                    .and_then(Value::as_array)
                    .map(|items| {
                        items
                            .iter()
                            .filter_map(|item| item.get("data").cloned())
                            .collect()
                    })
                    .unwrap_or_default();
                return Ok(json!({ "images": images }));
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dalle_request_maps_fields_and_drops_the_rest() {
        let input = json!({
            "model": "flux",
            "prompt": "cat",
            "sampler_name": "Euler",
            "width": 512,
            "height": 512,
            "steps": 4,
            "batch_count": 2,
        });
        let out = dalle_txt2img_request_adapter(input, "http://x/v1/images/generations");
        assert_eq!(out["prompt"], "cat");
        assert_eq!(out["response_format"], "b64_json");
        assert_eq!(out["quality"], "hd");
        assert_eq!(out["size"], "512x512");
        assert_eq!(out["style"], "Euler");
        assert_eq!(out["n"], 2);
        assert!(out.get("model").is_none());
        assert!(out.get("steps").is_none());
        assert!(out.get("sampler_name").is_none());
    }

    #[test]
    fn dalle_request_standard_quality_for_single_step() {
        let input = json!({"prompt": "p", "steps": 1});
        let out = dalle_txt2img_request_adapter(input, "http://x");
        assert_eq!(out["quality"], "standard");
    }

    #[tokio::test]
    async fn dalle_response_flattens_b64_list() {
        let client = reqwest::Client::new();
        let input = json!({"data": [{"b64_json": "aaa"}, {"b64_json": "bbb"}]});
        let out = dalle_txt2img_response_adapter(input, "http://x", &client)
            .await
            .unwrap();
        assert_eq!(out["images"], json!(["aaa", "bbb"]));
    }

    #[test]
    fn sd_server_request_renames_and_drops_model() {
        let input = json!({
            "model": "sd",
            "prompt": "p",
            "sampler_name": "Euler",
            "steps": 8,
        });
        let out = sd_server_txt2img_request_adapter(input, "http://x/txt2img");
        assert!(out.get("model").is_none());
        assert!(out.get("sampler_name").is_none());
        assert!(out.get("steps").is_none());
        assert_eq!(out["prompt"], "p");
        assert_eq!(out["sample_method"], "Euler");
        assert_eq!(out["sample_steps"], 8);
    }
}
