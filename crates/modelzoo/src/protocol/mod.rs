//! Protocol registry: a static table of supported backend wire protocols,
//! consulted by the supervisor (readiness probing) and the proxy (endpoint
//! selection + payload adaptation).

pub mod adapters;

use std::collections::HashMap;
use std::sync::OnceLock;

use adapters::{RequestAdapter, ResponseAdapter};

/// Which public operation a proxy request belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointClass {
    Completions,
    ChatCompletions,
    Txt2Img,
    Img2Img,
}

/// One public operation's backend path plus optional payload adapters.
/// `path: None` means the backend protocol doesn't support this operation
/// at all — candidates are filtered out before routing ever considers them.
#[derive(Default)]
pub struct Endpoint {
    pub path: Option<&'static str>,
    pub request_adapter: Option<RequestAdapter>,
    pub response_adapter: Option<ResponseAdapter>,
}

impl Endpoint {
    const fn path_only(path: &'static str) -> Self {
        Self {
            path: Some(path),
            request_adapter: None,
            response_adapter: None,
        }
    }

    const fn none() -> Self {
        Self {
            path: None,
            request_adapter: None,
            response_adapter: None,
        }
    }
}

/// The declarative description of one backend wire protocol.
pub struct ProtocolDef {
    pub health_check: Option<&'static str>,
    pub health_status: u16,
    pub completions: Endpoint,
    pub chat_completions: Endpoint,
    pub txt2img: Endpoint,
    pub img2img: Endpoint,
    /// Label -> backend-string table applied to an inbound `sampler_name`
    /// field before forwarding an image request. Unmapped labels pass
    /// through unchanged.
    pub image_sampler_map: Option<&'static [(&'static str, &'static str)]>,
}

impl ProtocolDef {
    pub fn endpoint(&self, class: EndpointClass) -> &Endpoint {
        match class {
            EndpointClass::Completions => &self.completions,
            EndpointClass::ChatCompletions => &self.chat_completions,
            EndpointClass::Txt2Img => &self.txt2img,
            EndpointClass::Img2Img => &self.img2img,
        }
    }

    pub fn map_sampler(&self, label: &str) -> String {
        match self.image_sampler_map {
            Some(table) => table
                .iter()
                .find(|(k, _)| *k == label)
                .map(|(_, v)| v.to_string())
                .unwrap_or_else(|| label.to_string()),
            None => label.to_string(),
        }
    }
}

const A1111_SAMPLER_MAP: &[(&str, &str)] = &[
    ("Euler", "k_euler"),
    ("Euler A", "k_euler_a"),
    ("Heun", "k_heun"),
    ("DPM2", "k_dpm_2"),
    ("DPM++", "k_dpmpp_2m"),
    ("LCM", "k_lcm"),
];

const SD_SERVER_SAMPLER_MAP: &[(&str, &str)] = &[
    ("Euler", "euler"),
    ("Euler A", "euler_a"),
    ("Heun", "heun"),
    ("DPM2", "dpm2"),
    ("DPM++", "dpm++2m"),
    ("LCM", "lcm"),
];

const DALLE_SAMPLER_MAP: &[(&str, &str)] = &[("Euler", "natural"), ("Euler A", "vivid")];

static REGISTRY: OnceLock<HashMap<&'static str, ProtocolDef>> = OnceLock::new();

/// The static protocol table. Built once and cached; consulted on every
/// readiness probe and every proxied request.
pub fn registry() -> &'static HashMap<&'static str, ProtocolDef> {
    REGISTRY.get_or_init(|| {
        let mut m = HashMap::new();

        m.insert(
            "openai",
            ProtocolDef {
                health_check: Some("/v1/models"),
                health_status: 200,
                completions: Endpoint::path_only("/v1/completions"),
                chat_completions: Endpoint::path_only("/v1/chat/completions"),
                txt2img: Endpoint::none(),
                img2img: Endpoint::none(),
                image_sampler_map: None,
            },
        );

        m.insert(
            "a1111",
            ProtocolDef {
                health_check: Some("/sdapi/v1/sd-models"),
                health_status: 200,
                completions: Endpoint::none(),
                chat_completions: Endpoint::none(),
                txt2img: Endpoint::path_only("/sdapi/v1/txt2img"),
                img2img: Endpoint::path_only("/sdapi/v1/img2img"),
                image_sampler_map: Some(A1111_SAMPLER_MAP),
            },
        );

        m.insert(
            "sd-server",
            ProtocolDef {
                health_check: Some("/"),
                health_status: 404,
                completions: Endpoint::none(),
                chat_completions: Endpoint::none(),
                txt2img: Endpoint {
                    path: Some("/txt2img"),
                    request_adapter: Some(adapters::sd_server_txt2img_request_adapter),
                    response_adapter: Some(adapters::sd_server_txt2img_response_adapter),
                },
                img2img: Endpoint::none(),
                image_sampler_map: Some(SD_SERVER_SAMPLER_MAP),
            },
        );

        m.insert(
            "dall-e",
            ProtocolDef {
                health_check: Some("/v1/models"),
                health_status: 200,
                completions: Endpoint::none(),
                chat_completions: Endpoint::none(),
                txt2img: Endpoint {
                    path: Some("/v1/images/generations"),
                    request_adapter: Some(adapters::dalle_txt2img_request_adapter),
                    response_adapter: Some(adapters::dalle_txt2img_response_adapter),
                },
                img2img: Endpoint::none(),
                image_sampler_map: Some(DALLE_SAMPLER_MAP),
            },
        );

        m
    })
}

/// Looks up a protocol by key, if the registry knows it.
pub fn get(protocol: &str) -> Option<&'static ProtocolDef> {
    registry().get(protocol)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sampler_map_passes_through_unmapped_labels() {
        let def = get("a1111").unwrap();
        assert_eq!(def.map_sampler("Euler"), "k_euler");
        assert_eq!(def.map_sampler("Totally Custom"), "Totally Custom");
    }

    #[test]
    fn openai_has_no_image_endpoints() {
        let def = get("openai").unwrap();
        assert!(def.endpoint(EndpointClass::Txt2Img).path.is_none());
        assert!(def.endpoint(EndpointClass::Completions).path.is_some());
    }

    #[test]
    fn sd_server_health_check_expects_404() {
        let def = get("sd-server").unwrap();
        assert_eq!(def.health_status, 404);
    }
}
