use super::EvaluationContext;
use crate::json_path::{extract_text, value_to_text, JsonPath};
use crate::metrics_api::MetricInput;
use serde_json::Value;

fn question(ctx: &EvaluationContext<'_>) -> String {
    let body = ctx.request.get("body").unwrap_or(&Value::Null);
    if let Some(path) = ctx.fields.input.as_deref().and_then(JsonPath::parse) {
        if let Some(v) = path.lookup(body).or_else(|| path.lookup(ctx.request)) {
            return value_to_text(v);
        }
    }
    match ctx.case_values.get("query") {
        Some(v) => value_to_text(v),
        None => value_to_text(body),
    }
}

fn texts(v: &Value) -> Vec<String> {
    match v {
        Value::Array(items) => items.iter().map(value_to_text).collect(),
        Value::Null => Vec::new(),
        other => vec![value_to_text(other)],
    }
}

fn context(ctx: &EvaluationContext<'_>) -> Vec<String> {
    if let Some(filter) = ctx.fields.context.as_deref() {
        let found: Vec<String> = filter
            .split(',')
            .filter_map(JsonPath::parse)
            .filter_map(|p| p.lookup(ctx.response))
            .flat_map(texts)
            .collect();
        if !found.is_empty() {
            return found;
        }
    }
    ctx.case_values.get("context").map(texts).unwrap_or_default()
}

/// The text view of one exchange that metrics and judges work on.
pub fn metric_input(ctx: &EvaluationContext<'_>) -> MetricInput {
    let answer = extract_text(ctx.response, ctx.fields.output.as_deref())
        .unwrap_or_else(|| value_to_text(ctx.response));
    MetricInput {
        query: question(ctx),
        answer,
        context: context(ctx),
        golden: ctx.golden.map(value_to_text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FieldMap, Values};
    use serde_json::json;

    #[test]
    fn pulls_fields_by_path() {
        let request = json!({"url": "http://svc", "body": {"messages": [{"content": "capital of France?"}]}});
        let response = json!({"answer": "Paris", "sources": ["Paris is the capital of France."]});
        let golden = json!("Paris");
        let fields = FieldMap {
            input: Some("messages[0].content".into()),
            output: Some("answer".into()),
            context: Some("sources".into()),
        };
        let values = Values::new();
        let ctx = EvaluationContext {
            request: &request,
            response: &response,
            golden: Some(&golden),
            fields: &fields,
            case_values: &values,
        };
        let input = metric_input(&ctx);
        assert_eq!(input.query, "capital of France?");
        assert_eq!(input.answer, "Paris");
        assert_eq!(input.context, vec!["Paris is the capital of France."]);
        assert_eq!(input.golden.as_deref(), Some("Paris"));
    }

    #[test]
    fn falls_back_to_case_values_and_whole_response() {
        let request = json!({"url": "http://svc", "body": {"q": "hi"}});
        let response = json!({"answer": "hello"});
        let fields = FieldMap::default();
        let values: Values = json!({"query": "hi there", "context": "greeting docs"})
            .as_object()
            .cloned()
            .unwrap();
        let ctx = EvaluationContext {
            request: &request,
            response: &response,
            golden: None,
            fields: &fields,
            case_values: &values,
        };
        let input = metric_input(&ctx);
        assert_eq!(input.query, "hi there");
        assert_eq!(input.answer, r#"{"answer":"hello"}"#);
        assert_eq!(input.context, vec!["greeting docs"]);
    }
}
