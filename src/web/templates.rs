use std::borrow::Cow;

use chrono::{Datelike, Utc};

use super::{
    forms::{CredentialsForm, FormErrors, StudentForm},
    models::StudentRow,
    session::SessionUser,
};

const BASE_STYLES: &str = r#"
        :root { color-scheme: light; }
        body { font-family: "Helvetica Neue", Arial, sans-serif; margin: 0; background: #f8fafc; color: #0f172a; }
        header { background: #ffffff; padding: 1.25rem 1.5rem; border-bottom: 1px solid #e2e8f0; }
        .header-bar { display: flex; justify-content: space-between; align-items: center; flex-wrap: wrap; gap: 1rem; max-width: 960px; margin: 0 auto; }
        .header-bar h1 { margin: 0; font-size: 1.5rem; }
        .header-bar h1 a { color: inherit; text-decoration: none; }
        nav { display: flex; gap: 0.75rem; align-items: center; flex-wrap: wrap; }
        nav a { color: #1d4ed8; text-decoration: none; font-weight: 600; background: #e0f2fe; padding: 0.45rem 0.9rem; border-radius: 999px; border: 1px solid #bfdbfe; }
        nav a:hover { background: #bfdbfe; }
        nav span { color: #475569; font-size: 0.95rem; }
        main { padding: 2rem 1.5rem; max-width: 960px; margin: 0 auto; box-sizing: border-box; }
        .panel { background: #ffffff; border-radius: 12px; border: 1px solid #e2e8f0; padding: 1.5rem; box-shadow: 0 18px 40px rgba(15, 23, 42, 0.08); margin-bottom: 2rem; }
        .panel h2 { margin-top: 0; }
        .form-grid { display: grid; gap: 1rem; grid-template-columns: repeat(auto-fit, minmax(200px, 1fr)); }
        label { display: block; margin-bottom: 0.4rem; font-weight: 600; }
        input { width: 100%; padding: 0.7rem; border-radius: 8px; border: 1px solid #cbd5f5; background: #f8fafc; color: #0f172a; box-sizing: border-box; font-size: 1rem; }
        input:focus { outline: none; border-color: #2563eb; box-shadow: 0 0 0 3px rgba(37, 99, 235, 0.12); }
        button { margin-top: 1rem; padding: 0.75rem 1.2rem; border: none; border-radius: 8px; background: #2563eb; color: #ffffff; font-weight: 600; cursor: pointer; }
        button:hover { background: #1d4ed8; }
        button.danger { margin-top: 0; padding: 0.45rem 0.8rem; background: #dc2626; }
        button.danger:hover { background: #b91c1c; }
        ul.errors { margin: 0.4rem 0 0; padding-left: 1.1rem; color: #b91c1c; font-size: 0.9rem; }
        table { width: 100%; border-collapse: collapse; background: #ffffff; }
        th, td { padding: 0.7rem 0.9rem; border-bottom: 1px solid #e2e8f0; text-align: left; }
        th { background: #f1f5f9; font-weight: 600; }
        td.actions { display: flex; gap: 0.5rem; align-items: center; }
        td.actions form { margin: 0; }
        td.actions a { color: #1d4ed8; font-weight: 600; text-decoration: none; }
        .flash { padding: 0.9rem 1.2rem; border-radius: 10px; margin-bottom: 1.5rem; font-weight: 600; border: 1px solid transparent; }
        .flash.success { background: #ecfdf3; border-color: #bbf7d0; color: #166534; }
        .flash.info { background: #eff6ff; border-color: #bfdbfe; color: #1d4ed8; }
        .flash.warning { background: #fffbeb; border-color: #fde68a; color: #92400e; }
        .flash.error { background: #fef2f2; border-color: #fecaca; color: #b91c1c; }
        .note { color: #475569; }
        .app-footer { margin-top: 3rem; text-align: center; font-size: 0.85rem; color: #94a3b8; }
"#;

pub struct PageLayout<'a> {
    pub title: &'a str,
    pub user: Option<&'a SessionUser>,
    pub flash_html: Cow<'a, str>,
    pub body_html: Cow<'a, str>,
}

pub fn render_page(layout: PageLayout<'_>) -> String {
    let PageLayout {
        title,
        user,
        flash_html,
        body_html,
    } = layout;

    let nav_html = match user {
        Some(user) => format!(
            r#"<span>Signed in as <strong>{username}</strong></span><a href="/">Students</a><a href="/logout">Log out</a>"#,
            username = escape_html(&user.username),
        ),
        None => r#"<a href="/">Students</a><a href="/login">Log in</a><a href="/register">Register</a>"#
            .to_string(),
    };
    let footer = render_footer();

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>{title} · Student Records</title>
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <style>
{styles}
    </style>
</head>
<body>
    <header>
        <div class="header-bar">
            <h1><a href="/">Student Records</a></h1>
            <nav>{nav_html}</nav>
        </div>
    </header>
    <main>
        {flash_html}
{body_html}
        {footer}
    </main>
</body>
</html>"#,
        title = escape_html(title),
        styles = BASE_STYLES,
        nav_html = nav_html,
        flash_html = flash_html,
        body_html = body_html,
        footer = footer,
    )
}

pub fn render_index_page(
    user: Option<&SessionUser>,
    flash_html: &str,
    students: &[StudentRow],
    form: &StudentForm,
    errors: &FormErrors,
    csrf_token: &str,
) -> String {
    let form_html = render_student_form(form, errors, csrf_token, "/", "Add student");

    let rows = if students.is_empty() {
        r#"<tr><td colspan="6">No students yet.</td></tr>"#.to_string()
    } else {
        students
            .iter()
            .map(|student| render_student_row(student, csrf_token))
            .collect::<String>()
    };

    let body = format!(
        r#"        <section class="panel">
            <h2>Add a student</h2>
{form_html}
        </section>
        <section class="panel">
            <h2>All students</h2>
            <table>
                <thead><tr><th>#</th><th>First name</th><th>Last name</th><th>Email</th><th>Phone</th><th>Actions</th></tr></thead>
                <tbody>{rows}</tbody>
            </table>
        </section>"#
    );

    render_page(PageLayout {
        title: "Students",
        user,
        flash_html: Cow::Borrowed(flash_html),
        body_html: Cow::Owned(body),
    })
}

fn render_student_row(student: &StudentRow, csrf_token: &str) -> String {
    format!(
        r#"<tr><td>{id}</td><td>{firstname}</td><td>{lastname}</td><td>{email}</td><td>{phone}</td><td class="actions"><a href="/update/{id}">Update</a><form method="post" action="/delete/{id}"><input type="hidden" name="csrf_token" value="{csrf}"><button type="submit" class="danger">Delete</button></form></td></tr>"#,
        id = student.id,
        firstname = escape_html(&student.firstname),
        lastname = escape_html(&student.lastname),
        email = escape_html(&student.email),
        phone = escape_html(&student.phone),
        csrf = escape_html(csrf_token),
    )
}

pub fn render_update_page(
    user: Option<&SessionUser>,
    flash_html: &str,
    student_id: i64,
    form: &StudentForm,
    errors: &FormErrors,
    csrf_token: &str,
) -> String {
    let action = format!("/update/{student_id}");
    let form_html = render_student_form(form, errors, csrf_token, &action, "Save changes");
    let body = format!(
        r#"        <section class="panel">
            <h2>Update student #{student_id}</h2>
{form_html}
        </section>"#
    );

    render_page(PageLayout {
        title: "Update student",
        user,
        flash_html: Cow::Borrowed(flash_html),
        body_html: Cow::Owned(body),
    })
}

fn render_student_form(
    form: &StudentForm,
    errors: &FormErrors,
    csrf_token: &str,
    action: &str,
    submit_label: &str,
) -> String {
    let fields = [
        render_input("firstname", "First name", "text", &form.firstname, errors),
        render_input("lastname", "Last name", "text", &form.lastname, errors),
        render_input("email", "Email", "email", &form.email, errors),
        render_input("phone", "Phone", "tel", &form.phone, errors),
    ]
    .concat();

    format!(
        r#"            <form method="post" action="{action}">
                <input type="hidden" name="csrf_token" value="{csrf}">
                <div class="form-grid">{fields}</div>
                <button type="submit">{submit_label}</button>
            </form>"#,
        action = escape_html(action),
        csrf = escape_html(csrf_token),
        fields = fields,
        submit_label = escape_html(submit_label),
    )
}

pub fn render_register_page(
    user: Option<&SessionUser>,
    flash_html: &str,
    form: &CredentialsForm,
    errors: &FormErrors,
    csrf_token: &str,
) -> String {
    let body = render_credentials_panel(
        "Create an account",
        "/register",
        "Register",
        form,
        errors,
        csrf_token,
        r#"Already registered? <a href="/login">Log in</a>."#,
    );

    render_page(PageLayout {
        title: "Register",
        user,
        flash_html: Cow::Borrowed(flash_html),
        body_html: Cow::Owned(body),
    })
}

pub fn render_login_page(
    user: Option<&SessionUser>,
    flash_html: &str,
    form: &CredentialsForm,
    errors: &FormErrors,
    csrf_token: &str,
    next: Option<&str>,
) -> String {
    let action = match next {
        Some(next) => format!("/login?next={}", urlencoding::encode(next)),
        None => "/login".to_string(),
    };
    let body = render_credentials_panel(
        "Log in",
        &action,
        "Log in",
        form,
        errors,
        csrf_token,
        r#"No account yet? <a href="/register">Register</a>."#,
    );

    render_page(PageLayout {
        title: "Log in",
        user,
        flash_html: Cow::Borrowed(flash_html),
        body_html: Cow::Owned(body),
    })
}

fn render_credentials_panel(
    heading: &str,
    action: &str,
    submit_label: &str,
    form: &CredentialsForm,
    errors: &FormErrors,
    csrf_token: &str,
    note_html: &str,
) -> String {
    // the password is never echoed back into the page
    let username = render_input("username", "Username", "text", &form.username, errors);
    let password = render_input("password", "Password", "password", "", errors);

    format!(
        r#"        <section class="panel">
            <h2>{heading}</h2>
            <form method="post" action="{action}">
                <input type="hidden" name="csrf_token" value="{csrf}">
                {username}
                {password}
                <button type="submit">{submit_label}</button>
            </form>
            <p class="note">{note_html}</p>
        </section>"#,
        heading = escape_html(heading),
        action = escape_html(action),
        csrf = escape_html(csrf_token),
        submit_label = escape_html(submit_label),
    )
}

fn render_input(name: &str, label: &str, input_type: &str, value: &str, errors: &FormErrors) -> String {
    let messages = errors.get(name);
    let errors_html = if messages.is_empty() {
        String::new()
    } else {
        let items = messages
            .iter()
            .map(|message| format!("<li>{}</li>", escape_html(message)))
            .collect::<String>();
        format!(r#"<ul class="errors">{items}</ul>"#)
    };

    format!(
        r#"<div class="field"><label for="{name}">{label}</label><input id="{name}" name="{name}" type="{input_type}" value="{value}">{errors_html}</div>"#,
        name = name,
        label = escape_html(label),
        input_type = input_type,
        value = escape_html(value),
        errors_html = errors_html,
    )
}

pub fn render_not_found_page(user: Option<&SessionUser>) -> String {
    render_page(PageLayout {
        title: "Not found",
        user,
        flash_html: Cow::Borrowed(""),
        body_html: Cow::Borrowed(
            r#"        <section class="panel">
            <h2>Page not found</h2>
            <p class="note">The page or record you asked for does not exist. <a href="/">Back to the student list</a>.</p>
        </section>"#,
        ),
    })
}

pub fn render_bad_request_page(user: Option<&SessionUser>) -> String {
    render_page(PageLayout {
        title: "Bad request",
        user,
        flash_html: Cow::Borrowed(""),
        body_html: Cow::Borrowed(
            r#"        <section class="panel">
            <h2>Bad request</h2>
            <p class="note">The form token is missing or has expired. Go back, reload the page and try again.</p>
        </section>"#,
        ),
    })
}

pub fn render_server_error_page(user: Option<&SessionUser>) -> String {
    render_page(PageLayout {
        title: "Server error",
        user,
        flash_html: Cow::Borrowed(""),
        body_html: Cow::Borrowed(
            r#"        <section class="panel">
            <h2>Something went wrong</h2>
            <p class="note">An unexpected error occurred and no changes were saved. Please try again later.</p>
        </section>"#,
        ),
    })
}

pub fn render_footer() -> String {
    let current_year = Utc::now().year();
    format!(r#"<footer class="app-footer">© {current_year} Student Records</footer>"#)
}

pub fn escape_html(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}
