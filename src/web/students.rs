use axum::{
    extract::{Form, Path, Query, State},
    http::{StatusCode, Uri},
    response::{Html, IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::SignedCookieJar;
use serde::Deserialize;
use tracing::{debug, info};

use crate::web::{
    AppState, csrf, data,
    auth::require_user,
    error::AppError,
    flash::{FlashQuery, compose_flash_message},
    forms::{FormErrors, StudentForm},
    session::{self, SessionUser},
    templates::{render_index_page, render_update_page},
};

#[derive(Default, Deserialize)]
pub struct DeleteForm {
    #[serde(default)]
    csrf_token: String,
}

pub async fn index(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    Query(flash): Query<FlashQuery>,
) -> Result<Response, AppError> {
    let flash_html = compose_flash_message(&flash);
    index_response(
        &state,
        jar,
        StatusCode::OK,
        &flash_html,
        &StudentForm::default(),
        &FormErrors::default(),
    )
    .await
}

pub async fn create_student(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    Form(form): Form<StudentForm>,
) -> Result<Response, AppError> {
    csrf::verify_token(&jar, &form.csrf_token)?;

    let student = match form.validate() {
        Ok(student) => student,
        Err(errors) => {
            debug!(?errors, "student form rejected");
            return index_response(
                &state,
                jar,
                StatusCode::UNPROCESSABLE_ENTITY,
                "",
                &form,
                &errors,
            )
            .await;
        }
    };

    let mut tx = state.pool_ref().begin().await?;
    let id = data::insert_student(&mut *tx, &student).await?;
    tx.commit().await?;

    info!(student_id = id, "student added");
    Ok(Redirect::to("/?status=student_added").into_response())
}

pub async fn update_page(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    uri: Uri,
    Path(raw_id): Path<String>,
    Query(flash): Query<FlashQuery>,
) -> Result<Response, AppError> {
    let user = require_user(&jar, &uri)?;
    let id = parse_student_id(&raw_id)?;

    let student = data::fetch_student(state.pool_ref(), id)
        .await?
        .ok_or(AppError::NotFound)?;

    let form = StudentForm::from_row(&student);
    Ok(update_response(
        &state,
        jar,
        StatusCode::OK,
        &user,
        &compose_flash_message(&flash),
        id,
        &form,
        &FormErrors::default(),
    ))
}

/// The body is only read once the session check has passed, so anonymous
/// posts are redirected to login whatever they carry.
pub async fn process_update(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    uri: Uri,
    Path(raw_id): Path<String>,
    form: Option<Form<StudentForm>>,
) -> Result<Response, AppError> {
    let user = require_user(&jar, &uri)?;
    let id = parse_student_id(&raw_id)?;
    let form = form.map(|Form(form)| form).unwrap_or_default();
    csrf::verify_token(&jar, &form.csrf_token)?;

    let mut tx = state.pool_ref().begin().await?;
    if data::fetch_student(&mut *tx, id).await?.is_none() {
        return Err(AppError::NotFound);
    }

    let student = match form.validate() {
        Ok(student) => student,
        Err(errors) => {
            debug!(student_id = id, ?errors, "student update rejected");
            return Ok(update_response(
                &state,
                jar,
                StatusCode::UNPROCESSABLE_ENTITY,
                &user,
                "",
                id,
                &form,
                &errors,
            ));
        }
    };

    data::update_student(&mut *tx, id, &student).await?;
    tx.commit().await?;

    info!(student_id = id, user_id = user.user_id, "student updated");
    Ok(Redirect::to("/?status=student_updated").into_response())
}

/// Deletes are reached from a form on the listing page, so an anonymous
/// visitor is sent back to the listing after logging in.
pub async fn delete_student(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    Path(raw_id): Path<String>,
    form: Option<Form<DeleteForm>>,
) -> Result<Response, AppError> {
    let user = require_user(&jar, &Uri::from_static("/"))?;
    let id = parse_student_id(&raw_id)?;
    let form = form.map(|Form(form)| form).unwrap_or_default();
    csrf::verify_token(&jar, &form.csrf_token)?;

    let mut tx = state.pool_ref().begin().await?;
    if data::fetch_student(&mut *tx, id).await?.is_none() {
        return Err(AppError::NotFound);
    }
    data::delete_student(&mut *tx, id).await?;
    tx.commit().await?;

    info!(student_id = id, user_id = user.user_id, "student deleted");
    Ok(Redirect::to("/?status=student_deleted").into_response())
}

/// Ids that are not positive integers can never match a row.
fn parse_student_id(raw: &str) -> Result<i64, AppError> {
    raw.parse::<i64>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or(AppError::NotFound)
}

async fn index_response(
    state: &AppState,
    jar: SignedCookieJar,
    status: StatusCode,
    flash_html: &str,
    form: &StudentForm,
    errors: &FormErrors,
) -> Result<Response, AppError> {
    let students = data::fetch_students(state.pool_ref()).await?;
    let user = session::current_user(&jar);
    let (jar, csrf_token) = csrf::issue_token(jar, state.secure_cookies());
    let html = render_index_page(
        user.as_ref(),
        flash_html,
        &students,
        form,
        errors,
        &csrf_token,
    );
    Ok((status, jar, Html(html)).into_response())
}

fn update_response(
    state: &AppState,
    jar: SignedCookieJar,
    status: StatusCode,
    user: &SessionUser,
    flash_html: &str,
    id: i64,
    form: &StudentForm,
    errors: &FormErrors,
) -> Response {
    let (jar, csrf_token) = csrf::issue_token(jar, state.secure_cookies());
    let html = render_update_page(Some(user), flash_html, id, form, errors, &csrf_token);
    (status, jar, Html(html)).into_response()
}
