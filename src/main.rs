use rocket::launch;

#[launch]
fn rocket() -> _ {
    arrival_sync::rocket()
}
