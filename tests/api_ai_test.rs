//! Integration tests for the assistant API endpoint

mod test_utils;

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use mockito::Matcher;
    use serde_json::{Value, json};
    use std::io::Write;
    use tower::util::ServiceExt;

    use crate::test_utils::{ACCESS_TOKEN, body_to_string, sse_events, test_app, test_config};

    fn ai_request(messages: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/ai")
            .header("Authorization", format!("Bearer {}", ACCESS_TOKEN))
            .header("content-type", "application/json")
            .body(Body::from(json!({"messages": messages}).to_string()))
            .unwrap()
    }

    /// A streamed completion that calls a single tool
    fn sse_tool_call(name: &str, arguments: Value) -> String {
        let chunk = json!({
            "id": "chunk1",
            "created": 1718000000,
            "model": "gpt-4.1-mini",
            "choices": [{
                "index": 0,
                "delta": {"tool_calls": [{
                    "index": 0,
                    "id": "call_1",
                    "type": "function",
                    "function": {"name": name, "arguments": arguments.to_string()}
                }]},
                "finish_reason": "tool_calls"
            }]
        });
        format!("data: {}\n\ndata: [DONE]\n\n", chunk)
    }

    /// A streamed completion that replies with `text`
    fn sse_text(text: &str) -> String {
        let chunk = json!({
            "id": "chunk2",
            "created": 1718000000,
            "model": "gpt-4.1-mini",
            "choices": [{"index": 0, "delta": {"content": text}, "finish_reason": "stop"}]
        });
        format!("data: {}\n\ndata: [DONE]\n\n", chunk)
    }

    fn find_event<'a>(events: &'a [Value], event_type: &str) -> &'a Value {
        events
            .iter()
            .find(|e| e["type"] == event_type)
            .unwrap_or_else(|| panic!("No {} event in {:?}", event_type, events))
    }

    /// Tests that the assistant refuses to start without a session
    #[tokio::test]
    async fn it_returns_401_without_session() {
        let mut server = mockito::Server::new_async().await;
        let llm_mock = server
            .mock("POST", "/v1/chat/completions")
            .expect(0)
            .create_async()
            .await;
        let app = test_app(test_config(&server.url(), &server.url()));

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/ai")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        json!({"messages": [{"role": "user", "content": "Hola"}]}).to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();

        llm_mock.assert_async().await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    /// Tests a request to create a meeting with a video call from
    /// start to finish
    #[tokio::test]
    async fn it_creates_meeting_with_meet_from_chat() {
        let mut llm = mockito::Server::new_async().await;
        let mut calendar = mockito::Server::new_async().await;

        // Mocks on the same path are matched in the order they're created
        let first_completion = llm
            .mock("POST", "/v1/chat/completions")
            .match_body(Matcher::AllOf(vec![
                Matcher::Regex(r#""role":"system","content":"You are the assistant of Quickal"#.to_string()),
                Matcher::Regex("Meeting tomorrow at 10 with Meet".to_string()),
                Matcher::Regex(r#""name":"createEvent""#.to_string()),
            ]))
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body(sse_tool_call(
                "createEvent",
                json!({
                    "summary": "Meeting",
                    "startDateTime": "2024-06-11T10:00:00",
                    "endDateTime": "2024-06-11T11:00:00",
                    "addMeet": true
                }),
            ))
            .create_async()
            .await;
        let second_completion = llm
            .mock("POST", "/v1/chat/completions")
            .match_body(Matcher::Regex(r#""tool_call_id":"call_1""#.to_string()))
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body(sse_text("Done, the meeting is tomorrow at 10 with a Meet link."))
            .create_async()
            .await;
        let create_mock = calendar
            .mock("POST", "/calendars/primary/events")
            .match_header("authorization", format!("Bearer {}", ACCESS_TOKEN).as_str())
            .match_query(Matcher::UrlEncoded("conferenceDataVersion".into(), "1".into()))
            .match_body(Matcher::PartialJson(json!({
                "summary": "Meeting",
                "start": {"dateTime": "2024-06-11T10:00:00", "timeZone": "Europe/Madrid"},
                "conferenceData": {"createRequest": {"conferenceSolutionKey": {"type": "hangoutsMeet"}}}
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "id": "meet1",
                    "summary": "Meeting",
                    "start": {"dateTime": "2024-06-11T10:00:00+02:00", "timeZone": "Europe/Madrid"},
                    "end": {"dateTime": "2024-06-11T11:00:00+02:00", "timeZone": "Europe/Madrid"},
                    "htmlLink": "https://www.google.com/calendar/event?eid=meet1",
                    "conferenceData": {"entryPoints": [
                        {"entryPointType": "video", "uri": "https://meet.google.com/abc-defg-hij"}
                    ]}
                })
                .to_string(),
            )
            .create_async()
            .await;
        let app = test_app(test_config(&calendar.url(), &llm.url()));

        let response = app
            .oneshot(ai_request(json!([
                {"role": "user", "content": "Meeting tomorrow at 10 with Meet"}
            ])))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_to_string(response.into_body()).await;
        let events = sse_events(&body);

        first_completion.assert_async().await;
        second_completion.assert_async().await;
        create_mock.assert_async().await;

        let tool_call = find_event(&events, "tool-call");
        assert_eq!(tool_call["toolName"], "createEvent");
        assert_eq!(tool_call["input"]["addMeet"], true);
        assert!(
            tool_call["input"]["startDateTime"]
                .as_str()
                .unwrap()
                .starts_with("2024-06-11")
        );

        let tool_result = find_event(&events, "tool-result");
        assert_eq!(tool_result["toolCallId"], "call_1");
        assert_eq!(tool_result["output"]["success"], true);
        assert_eq!(
            tool_result["output"]["event"]["meetLink"],
            "https://meet.google.com/abc-defg-hij"
        );

        let text = find_event(&events, "text-delta");
        assert_eq!(
            text["delta"],
            "Done, the meeting is tomorrow at 10 with a Meet link."
        );
        assert_eq!(events.last().unwrap()["type"], "finish");
    }

    /// Tests that a failing tool is reported to the model instead of
    /// ending the response
    #[tokio::test]
    async fn it_folds_tool_failures_into_results() {
        let mut llm = mockito::Server::new_async().await;
        let mut calendar = mockito::Server::new_async().await;

        let _first_completion = llm
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body(sse_tool_call("deleteEvent", json!({"eventId": "missing"})))
            .create_async()
            .await;
        let second_completion = llm
            .mock("POST", "/v1/chat/completions")
            .match_body(Matcher::Regex("Event missing not found".to_string()))
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body(sse_text("I couldn't find that event."))
            .create_async()
            .await;
        let _delete_mock = calendar
            .mock("DELETE", "/calendars/primary/events/missing")
            .with_status(404)
            .with_body(r#"{"error": {"code": 404, "message": "Not Found"}}"#)
            .create_async()
            .await;
        let app = test_app(test_config(&calendar.url(), &llm.url()));

        let response = app
            .oneshot(ai_request(json!([
                {"role": "user", "content": "Delete the event called missing"}
            ])))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let events = sse_events(&body_to_string(response.into_body()).await);

        second_completion.assert_async().await;
        let tool_result = find_event(&events, "tool-result");
        assert_eq!(
            tool_result["output"],
            json!({"success": false, "error": "Event missing not found"})
        );
        assert!(events.iter().all(|e| e["type"] != "error"));
        assert_eq!(events.last().unwrap()["type"], "finish");
    }

    /// Tests that a failing completion API ends the stream with an
    /// error event
    #[tokio::test]
    async fn it_streams_error_when_model_fails() {
        let mut llm = mockito::Server::new_async().await;
        let _completion = llm
            .mock("POST", "/v1/chat/completions")
            .with_status(500)
            .with_body("upstream exploded")
            .create_async()
            .await;
        let app = test_app(test_config(&llm.url(), &llm.url()));

        let response = app
            .oneshot(ai_request(json!([{"role": "user", "content": "Hola"}])))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let events = sse_events(&body_to_string(response.into_body()).await);

        let error = find_event(&events, "error");
        assert!(
            error["errorText"]
                .as_str()
                .unwrap()
                .starts_with("Something went wrong")
        );
        assert!(events.iter().all(|e| e["type"] != "finish"));
    }

    /// Tests that a model slower than the configured limit ends the
    /// stream with an error event
    #[tokio::test]
    async fn it_streams_error_when_response_takes_too_long() {
        let mut llm = mockito::Server::new_async().await;
        let _completion = llm
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_chunked_body(|w| {
                std::thread::sleep(std::time::Duration::from_secs(2));
                w.write_all(sse_text("Too late").as_bytes())
            })
            .create_async()
            .await;
        let mut config = test_config(&llm.url(), &llm.url());
        config.ai_max_duration = std::time::Duration::from_millis(200);
        let app = test_app(config);

        let response = app
            .oneshot(ai_request(json!([{"role": "user", "content": "Hola"}])))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let events = sse_events(&body_to_string(response.into_body()).await);

        assert_eq!(
            events,
            vec![json!({
                "type": "error",
                "errorText": "The assistant took too long to respond"
            })]
        );
    }
}
