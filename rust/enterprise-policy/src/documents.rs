//! Loads policy and parameters resources from multi-document YAML (or JSON) manifests.

use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Deserialize};
use snafu::{OptionExt, ResultExt, Snafu};
use stackable_operator::kube::{Resource, ResourceExt};

use crate::{
    crd::v1alpha1::{
        EnterpriseAgentgatewayParameters, EnterpriseAgentgatewayPolicy,
        EnterpriseKgatewayParameters, EnterpriseKgatewayTrafficPolicy, WAFPolicy,
    },
    extensions::SharedExtensions,
    validation::{validate, Violations},
};

const MANIFEST_EXTENSIONS: &[&str] = &["yaml", "yml", "json"];

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to read {}", path.display()))]
    ReadFile {
        source: std::io::Error,
        path: PathBuf,
    },

    #[snafu(display("failed to list manifests in {}", path.display()))]
    WalkDir {
        source: walkdir::Error,
        path: PathBuf,
    },

    #[snafu(display("failed to parse document {index} as YAML"))]
    ParseYaml {
        source: serde_yaml::Error,
        index: usize,
    },

    #[snafu(display("document {index} has no apiVersion and kind"))]
    MissingKind { index: usize },

    #[snafu(display("document {index} is a {api_version}/{kind}, which is not supported"))]
    UnknownKind {
        index: usize,
        api_version: String,
        kind: String,
    },

    #[snafu(display("failed to decode document {index} as {kind}"))]
    DecodeResource {
        source: serde_yaml::Error,
        index: usize,
        kind: String,
    },

    #[snafu(display("invalid manifest {}", path.display()))]
    InvalidManifest {
        #[snafu(source(from(Error, Box::new)))]
        source: Box<Error>,
        path: PathBuf,
    },
}

/// One of the resources defined by this crate.
#[derive(Clone, Debug)]
pub enum Document {
    AgentgatewayPolicy(EnterpriseAgentgatewayPolicy),
    TrafficPolicy(EnterpriseKgatewayTrafficPolicy),
    WafPolicy(WAFPolicy),
    AgentgatewayParameters(EnterpriseAgentgatewayParameters),
    KgatewayParameters(EnterpriseKgatewayParameters),
}

impl Document {
    pub fn kind(&self) -> String {
        match self {
            Document::AgentgatewayPolicy(r) => type_kind(r),
            Document::TrafficPolicy(r) => type_kind(r),
            Document::WafPolicy(r) => type_kind(r),
            Document::AgentgatewayParameters(r) => type_kind(r),
            Document::KgatewayParameters(r) => type_kind(r),
        }
    }

    pub fn name(&self) -> String {
        match self {
            Document::AgentgatewayPolicy(r) => r.name_any(),
            Document::TrafficPolicy(r) => r.name_any(),
            Document::WafPolicy(r) => r.name_any(),
            Document::AgentgatewayParameters(r) => r.name_any(),
            Document::KgatewayParameters(r) => r.name_any(),
        }
    }

    pub fn validate(&self) -> Result<(), Violations> {
        match self {
            Document::AgentgatewayPolicy(r) => validate(&r.spec),
            Document::TrafficPolicy(r) => validate(&r.spec),
            Document::WafPolicy(r) => validate(&r.spec),
            Document::AgentgatewayParameters(r) => validate(&r.spec),
            Document::KgatewayParameters(r) => validate(&r.spec),
        }
    }

    /// The shared extensions that a parameters document configures.
    pub fn shared_extensions(&self) -> Option<&dyn SharedExtensions> {
        match self {
            Document::AgentgatewayParameters(r) => Some(&r.spec),
            Document::KgatewayParameters(r) => Some(&r.spec),
            _ => None,
        }
    }
}

fn type_kind<K: Resource<DynamicType = ()>>(_: &K) -> String {
    K::kind(&()).into_owned()
}

fn is_type<K: Resource<DynamicType = ()>>(api_version: &str, kind: &str) -> bool {
    K::api_version(&()) == api_version && K::kind(&()) == kind
}

fn decode<K: DeserializeOwned>(doc: serde_yaml::Value) -> Result<K, serde_yaml::Error> {
    serde_yaml::with::singleton_map_recursive::deserialize(doc)
}

fn decode_document(index: usize, doc: serde_yaml::Value) -> Result<Document, Error> {
    let type_meta = |field: &str| doc.get(field).and_then(serde_yaml::Value::as_str);
    let (api_version, kind) = type_meta("apiVersion")
        .zip(type_meta("kind"))
        .context(MissingKindSnafu { index })?;
    let (api_version, kind) = (api_version.to_string(), kind.to_string());
    let decode_context = || DecodeResourceSnafu {
        index,
        kind: kind.clone(),
    };

    Ok(
        if is_type::<EnterpriseAgentgatewayPolicy>(&api_version, &kind) {
            Document::AgentgatewayPolicy(decode(doc).with_context(|_| decode_context())?)
        } else if is_type::<EnterpriseKgatewayTrafficPolicy>(&api_version, &kind) {
            Document::TrafficPolicy(decode(doc).with_context(|_| decode_context())?)
        } else if is_type::<WAFPolicy>(&api_version, &kind) {
            Document::WafPolicy(decode(doc).with_context(|_| decode_context())?)
        } else if is_type::<EnterpriseAgentgatewayParameters>(&api_version, &kind) {
            Document::AgentgatewayParameters(decode(doc).with_context(|_| decode_context())?)
        } else if is_type::<EnterpriseKgatewayParameters>(&api_version, &kind) {
            Document::KgatewayParameters(decode(doc).with_context(|_| decode_context())?)
        } else {
            return UnknownKindSnafu {
                index,
                api_version,
                kind,
            }
            .fail();
        },
    )
}

/// Parses every document in `data`. Empty documents are skipped.
pub fn parse_documents(data: &str) -> Result<Vec<Document>, Error> {
    let mut documents = Vec::new();
    for (index, de) in serde_yaml::Deserializer::from_str(data).enumerate() {
        let doc = serde_yaml::Value::deserialize(de).context(ParseYamlSnafu { index })?;
        if doc.is_null() {
            continue;
        }
        documents.push(decode_document(index, doc)?);
    }
    Ok(documents)
}

pub fn load_file(path: &Path) -> Result<Vec<Document>, Error> {
    let data = std::fs::read_to_string(path).context(ReadFileSnafu { path })?;
    parse_documents(&data).context(InvalidManifestSnafu { path })
}

/// Loads every manifest in `paths`, descending into directories.
///
/// Files that are named explicitly are always loaded. Inside directories only `.yaml`, `.yml` and
/// `.json` files are, in file name order.
pub fn load_paths<P: AsRef<Path>>(
    paths: impl IntoIterator<Item = P>,
) -> Result<Vec<(PathBuf, Document)>, Error> {
    let mut documents = Vec::new();
    for root in paths {
        let root = root.as_ref();
        for entry in walkdir::WalkDir::new(root).sort_by_file_name() {
            let entry = entry.context(WalkDirSnafu { path: root })?;
            if !entry.file_type().is_file() || !(entry.depth() == 0 || is_manifest(entry.path())) {
                continue;
            }
            let path = entry.path();
            tracing::debug!(path = %path.display(), "loading manifest");
            documents.extend(
                load_file(path)?
                    .into_iter()
                    .map(|document| (path.to_owned(), document)),
            );
        }
    }
    Ok(documents)
}

fn is_manifest(path: &Path) -> bool {
    path.extension()
        .and_then(|extension| extension.to_str())
        .is_some_and(|extension| MANIFEST_EXTENSIONS.contains(&extension))
}
