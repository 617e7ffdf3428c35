#[rocket::launch]
fn launch() -> _ {
    conversation_gateway::init_tracing();
    conversation_gateway::rocket()
}
