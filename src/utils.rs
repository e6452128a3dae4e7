use actix_web::http::header::ContentType;
use actix_web::http::header::LOCATION;
use actix_web::HttpResponse;

/// `302 Found` to `location`
pub fn redirect(location: &str) -> HttpResponse {
    HttpResponse::Found()
        .insert_header((LOCATION, location))
        .finish()
}

/// `200 OK` with a `text/plain` body
pub fn plain_text(body: &'static str) -> HttpResponse {
    HttpResponse::Ok()
        .content_type(ContentType::plaintext())
        .body(body)
}
