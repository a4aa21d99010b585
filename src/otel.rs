// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # OpenTelemetry Integration
//!
//! Trace context travels in AMQP message headers: the publisher injects the
//! current context, the consumer extracts it and opens a consumer span per
//! delivery. Without an installed tracer provider every call is a no-op.

use lapin::{
    protocol::basic::AMQPProperties,
    types::{AMQPValue, ShortString},
};
use opentelemetry::{
    global::{BoxedSpan, BoxedTracer},
    propagation::{Extractor, Injector},
    trace::{SpanKind, Tracer},
    Context,
};
use std::{borrow::Cow, collections::BTreeMap};
use tracing::error;

/// Writes trace context entries into outgoing message headers.
pub(crate) struct HeaderInjector<'a> {
    headers: &'a mut BTreeMap<ShortString, AMQPValue>,
}

impl<'a> HeaderInjector<'a> {
    pub(crate) fn new(headers: &'a mut BTreeMap<ShortString, AMQPValue>) -> Self {
        Self { headers }
    }
}

impl Injector for HeaderInjector<'_> {
    fn set(&mut self, key: &str, value: String) {
        self.headers.insert(
            key.to_lowercase().into(),
            AMQPValue::LongString(value.into()),
        );
    }
}

/// Reads trace context entries from incoming message headers.
pub(crate) struct HeaderExtractor<'a> {
    headers: &'a BTreeMap<ShortString, AMQPValue>,
}

impl<'a> HeaderExtractor<'a> {
    pub(crate) fn new(headers: &'a BTreeMap<ShortString, AMQPValue>) -> Self {
        Self { headers }
    }
}

impl Extractor for HeaderExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.headers.get(key).and_then(|header_value| {
            if let AMQPValue::LongString(header_value) = header_value {
                std::str::from_utf8(header_value.as_bytes())
                    .map_err(|e| error!("Error decoding header value {:?}", e))
                    .ok()
            } else {
                None
            }
        })
    }

    fn keys(&self) -> Vec<&str> {
        self.headers.keys().map(|header| header.as_str()).collect()
    }
}

/// Extracts the propagated context from the delivery properties and starts a
/// consumer span named `name` under it.
pub(crate) fn new_span(
    props: &AMQPProperties,
    tracer: &BoxedTracer,
    name: &str,
) -> (Context, BoxedSpan) {
    let headers = props
        .headers()
        .as_ref()
        .map(|table| table.inner().clone())
        .unwrap_or_default();

    let ctx = opentelemetry::global::get_text_map_propagator(|propagator| {
        propagator.extract(&HeaderExtractor::new(&headers))
    });

    let span = tracer
        .span_builder(Cow::from(name.to_owned()))
        .with_kind(SpanKind::Consumer)
        .start_with_context(tracer, &ctx);

    (ctx, span)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn injected_entries_are_extractable() {
        let mut headers = BTreeMap::new();
        HeaderInjector::new(&mut headers).set("TraceParent", "00-abc-def-01".to_owned());

        let extractor = HeaderExtractor::new(&headers);
        assert_eq!(extractor.get("traceparent"), Some("00-abc-def-01"));
        assert_eq!(extractor.keys(), vec!["traceparent"]);
    }

    #[test]
    fn non_string_headers_are_ignored() {
        let mut headers = BTreeMap::new();
        headers.insert(ShortString::from("count"), AMQPValue::LongInt(3));

        assert_eq!(HeaderExtractor::new(&headers).get("count"), None);
    }
}
