use super::*;

#[test]
fn test_chat_request_builder() {
    let request = ChatRequest::new("gpt-4o-mini")
        .with_message(Message::system("Be brief."))
        .with_messages(vec![Message::user("hi"), Message::assistant("hello")])
        .temperature(0.2)
        .max_tokens(64)
        .stream();

    assert_eq!(request.model, "gpt-4o-mini");
    assert_eq!(request.messages.len(), 3);
    assert_eq!(request.messages[0].role, Role::System);
    assert_eq!(request.options.temperature, Some(0.2));
    assert_eq!(request.options.max_tokens, Some(64));
    assert!(request.options.stream);
}

#[test]
fn test_default_request_is_not_streaming() {
    let request = ChatRequest::default();
    assert!(request.messages.is_empty());
    assert!(!request.options.stream);
}
