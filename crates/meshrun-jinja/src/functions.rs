//! Template functions bound to a resolution scope
//!
//! `ref()` and `source()` expand to physical names; `config()` expands to
//! nothing, its arguments having been read when the model was loaded.

use meshrun_core::Reference;
use minijinja::value::{Kwargs, Value};
use minijinja::{Environment, Error, ErrorKind};
use std::sync::Arc;
use crate::context::{ResolutionRecorder, ResolutionScope};
use crate::resolver::ResolveError;

/// Register `ref`, `source` and `config` for one render of `model`
pub fn register(
    env: &mut Environment<'_>,
    scope: Arc<ResolutionScope>,
    recorder: ResolutionRecorder,
    model: &str,
) {
    let (ref_scope, ref_recorder, ref_model) = (scope.clone(), recorder.clone(), model.to_string());
    env.add_function(
        "ref",
        move |first: String, second: Option<String>| -> Result<Value, Error> {
            let reference = match second {
                // ref('own_project', 'model') is a local ref
                Some(name) if first == ref_scope.project_name() => Reference::model(name),
                Some(name) => Reference::upstream(first, name),
                None => Reference::model(first),
            };
            resolve_reference(&ref_scope, &ref_recorder, &ref_model, reference)
        },
    );

    let model = model.to_string();
    env.add_function(
        "source",
        move |namespace: String, name: String| -> Result<Value, Error> {
            resolve_reference(&scope, &recorder, &model, Reference::source(namespace, name))
        },
    );

    env.add_function("config", config_function);
}

/// Resolve one marker, recording the dependency or the failure
pub fn resolve_reference(
    scope: &ResolutionScope,
    recorder: &ResolutionRecorder,
    model: &str,
    reference: Reference,
) -> Result<Value, Error> {
    let Some(relation) = scope.lookup(&reference) else {
        let error = ResolveError::UnresolvedReference {
            model: model.to_string(),
            reference,
        };
        let message = error.to_string();
        recorder.record_failure(error);
        return Err(Error::new(ErrorKind::InvalidOperation, message));
    };

    let claimants = scope.claimants(relation);
    if claimants.len() > 1 {
        let error = ResolveError::AmbiguousReference {
            model: model.to_string(),
            reference,
            relation: relation.to_string(),
            claimants: claimants.iter().map(ToString::to_string).collect(),
        };
        let message = error.to_string();
        recorder.record_failure(error);
        return Err(Error::new(ErrorKind::InvalidOperation, message));
    }

    tracing::trace!(model, %reference, relation, "resolved reference");
    recorder.record_dependency(reference);
    Ok(Value::from(relation))
}

/// config() - consumes its keyword arguments and renders nothing
pub fn config_function(kwargs: Kwargs) -> Result<Value, Error> {
    let keys: Vec<String> = kwargs.args().map(str::to_string).collect();
    for key in &keys {
        let _: Value = kwargs.get(key)?;
    }
    Ok(Value::from(""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshrun_core::{Config, SourceConfig};
    use meshrun_project::{Model, Project};
    use pretty_assertions::assert_eq;

    fn scope() -> ResolutionScope {
        let mut config = Config::default();
        config.name = "dbt_up".to_string();
        config.sources = vec![SourceConfig::new("raw", "raw_orders")];
        let model = Model::from_sql("stg_orders", "models/stg_orders.sql", "select 1", &config).unwrap();
        ResolutionScope::from_project(&Project::from_parts(config, vec![model]).unwrap())
    }

    #[test]
    fn resolves_and_records() {
        let scope = scope();
        let recorder = ResolutionRecorder::new();

        let value = resolve_reference(&scope, &recorder, "m", Reference::model("stg_orders")).unwrap();
        assert_eq!(value.as_str(), Some("main.stg_orders"));
        assert_eq!(recorder.dependencies(), vec![Reference::model("stg_orders")]);
        assert!(recorder.take_failure().is_none());
    }

    #[test]
    fn unresolved_is_recorded_before_erroring() {
        let scope = scope();
        let recorder = ResolutionRecorder::new();

        let err = resolve_reference(&scope, &recorder, "m", Reference::source("raw", "nope")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidOperation);
        assert!(recorder.dependencies().is_empty());
        assert!(matches!(
            recorder.take_failure(),
            Some(ResolveError::UnresolvedReference { ref reference, .. })
                if *reference == Reference::source("raw", "nope")
        ));
    }

    #[test]
    fn registered_functions_render() {
        let scope = Arc::new(scope());
        let recorder = ResolutionRecorder::new();
        let mut env = Environment::new();
        register(&mut env, scope, recorder.clone(), "m");

        let rendered = env
            .render_str(
                "{{ config(materialized='table', access='public') }}select * from {{ ref('dbt_up', 'stg_orders') }}, {{ source('raw', 'raw_orders') }}",
                (),
            )
            .unwrap();

        assert_eq!(rendered, "select * from main.stg_orders, raw.raw_orders");
        assert_eq!(
            recorder.dependencies(),
            vec![Reference::model("stg_orders"), Reference::source("raw", "raw_orders")]
        );
    }
}
