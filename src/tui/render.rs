use std::borrow::Cow;

use super::state::{sort_label, ComposeField, InputMode, Notice, NoticeLevel, ViewState};
use microblog_feed::engine::model::{DashboardStats, FeedSnapshot, Post};
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
    Frame,
};

/// Lines each post takes in the feed, including the spacer.
const POST_HEIGHT: usize = 4;

pub fn draw(f: &mut Frame, snapshot: &FeedSnapshot, view: &ViewState, notice: Option<&Notice>) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(6),
            Constraint::Length(1),
            Constraint::Length(1),
        ])
        .split(f.area());

    draw_header(f, snapshot, chunks[0]);

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(68), Constraint::Percentage(32)])
        .split(chunks[1]);
    draw_feed(f, snapshot, view, body[0]);
    draw_sidebar(f, snapshot, body[1]);

    draw_notice(f, notice, chunks[2]);
    draw_footer(f, view, chunks[3]);

    match &view.mode {
        InputMode::Normal => {}
        InputMode::ConfirmDelete(post_id) => draw_confirm(f, *post_id),
        InputMode::Compose(draft) => draw_compose(f, &draft.text, &draft.attachment, draft.field),
        InputMode::ApiKey(buffer) => draw_api_key(f, buffer),
    }
}

fn draw_header(f: &mut Frame, snapshot: &FeedSnapshot, area: Rect) {
    let who = match (&snapshot.viewer, snapshot.signed_in) {
        (Some(viewer), _) => Span::styled(viewer.name.clone(), Style::default().fg(Color::Green)),
        (None, true) => Span::styled("loading…", Style::default().fg(Color::DarkGray)),
        (None, false) => Span::styled("signed out (press a)", Style::default().fg(Color::Red)),
    };

    let page = snapshot.page.map(|p| p.page).unwrap_or(snapshot.query.page);
    let line = Line::from(vec![
        Span::raw(" "),
        who,
        Span::raw(format!(
            " | Sort: {} | Per page: {} | Page {}",
            sort_label(snapshot.query.sort),
            snapshot.query.limit,
            page
        )),
        Span::styled(
            if snapshot.has_previous() { "  ◀" } else { "   " },
            Style::default().fg(Color::Cyan),
        ),
        Span::styled(
            if snapshot.has_next() { " ▶" } else { "  " },
            Style::default().fg(Color::Cyan),
        ),
    ]);

    let block = Block::default().title(" Microblog ").borders(Borders::ALL);
    f.render_widget(Paragraph::new(line).block(block), area);
}

fn draw_feed(f: &mut Frame, snapshot: &FeedSnapshot, view: &ViewState, area: Rect) {
    let block = Block::default()
        .title(format!(" Feed ({}) ", snapshot.posts.len()))
        .borders(Borders::ALL);

    if snapshot.posts.is_empty() {
        let para = Paragraph::new(vec![
            Line::from(""),
            Line::from(Span::styled(
                "No updates yet. Share the first one!",
                Style::default().fg(Color::Yellow),
            )),
        ])
        .alignment(Alignment::Center)
        .block(block);
        f.render_widget(para, area);
        return;
    }

    let inner_width = area.width.saturating_sub(4) as usize;
    let mut lines: Vec<Line> = Vec::with_capacity(snapshot.posts.len() * POST_HEIGHT);
    for (idx, post) in snapshot.posts.iter().enumerate() {
        let selected = idx == view.selected;
        lines.extend(post_lines(post, selected, snapshot.can_delete(post), view.likers_preview, inner_width));
    }

    // Keep the selected post in view
    let visible = area.height.saturating_sub(2) as usize;
    let selected_bottom = (view.selected + 1) * POST_HEIGHT;
    let scroll = selected_bottom.saturating_sub(visible);

    let para = Paragraph::new(lines)
        .block(block)
        .scroll((scroll.min(u16::MAX as usize) as u16, 0));
    f.render_widget(para, area);
}

fn post_lines(post: &Post, selected: bool, own: bool, likers_preview: usize, width: usize) -> Vec<Line<'static>> {
    let marker = if selected { "▶ " } else { "  " };
    let name_style = if selected {
        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)
    } else {
        Style::default().add_modifier(Modifier::BOLD)
    };
    let heart = if post.liked_by_viewer {
        Span::styled(format!("♥ {}", post.like_count), Style::default().fg(Color::Red))
    } else {
        Span::styled(format!("♡ {}", post.like_count), Style::default().fg(Color::DarkGray))
    };
    let stamp = post
        .created_at
        .with_timezone(&chrono::Local)
        .format("%b %d %H:%M")
        .to_string();

    let mut header = vec![
        Span::raw(marker),
        Span::styled(post.author.name.clone(), name_style),
        Span::styled(format!(" · {} · ", stamp), Style::default().fg(Color::DarkGray)),
        heart,
    ];
    if !post.attachments.is_empty() {
        header.push(Span::styled(
            format!(" · {} attachment(s)", post.attachments.len()),
            Style::default().fg(Color::Magenta),
        ));
    }
    if own {
        header.push(Span::styled(" · yours", Style::default().fg(Color::DarkGray)));
    }

    let content = truncate_with_ellipsis(&post.content.replace('\n', " "), width.saturating_sub(2)).into_owned();
    vec![
        Line::from(header),
        Line::from(format!("  {}", content)),
        Line::from(Span::styled(
            format!("  {}", likers_summary(post, likers_preview)),
            Style::default().fg(Color::DarkGray),
        )),
        Line::from(""),
    ]
}

/// "Liked by Bob, Carol and 3 others". The preview may list fewer people
/// than the count.
pub fn likers_summary(post: &Post, preview: usize) -> String {
    if post.like_count == 0 {
        return String::new();
    }
    let shown: Vec<&str> = post
        .likers
        .iter()
        .take(preview)
        .map(|l| l.name.as_str())
        .collect();
    let remaining = post.like_count.saturating_sub(shown.len() as u64);
    match (shown.is_empty(), remaining) {
        (true, n) => format!("{} like(s)", n),
        (false, 0) => format!("Liked by {}", shown.join(", ")),
        (false, n) => format!("Liked by {} and {} more", shown.join(", "), n),
    }
}

fn draw_sidebar(f: &mut Frame, snapshot: &FeedSnapshot, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(6), Constraint::Min(4)])
        .split(area);

    let profile_lines = match &snapshot.viewer {
        Some(viewer) => {
            let following: Vec<&str> = viewer.following.iter().take(6).map(|u| u.name.as_str()).collect();
            let mut following_line = if following.is_empty() {
                "Not following anyone yet".to_string()
            } else {
                following.join(", ")
            };
            if viewer.following.len() > 6 {
                following_line.push_str(&format!(" +{} more", viewer.following.len() - 6));
            }
            vec![
                Line::from(Span::styled(viewer.name.clone(), Style::default().add_modifier(Modifier::BOLD))),
                Line::from(format!(
                    "{} followers · {} following",
                    viewer.followers.len(),
                    viewer.following.len()
                )),
                Line::from(Span::styled(following_line, Style::default().fg(Color::DarkGray))),
            ]
        }
        None => vec![Line::from("Unknown member")],
    };
    let para = Paragraph::new(profile_lines)
        .wrap(Wrap { trim: true })
        .block(Block::default().title(" You ").borders(Borders::ALL));
    f.render_widget(para, chunks[0]);

    let stats_lines = match &snapshot.stats {
        Some(stats) => stats_lines(stats, area.width.saturating_sub(4) as usize),
        None => vec![Line::from(Span::styled("No stats", Style::default().fg(Color::DarkGray)))],
    };
    let para = Paragraph::new(stats_lines).block(Block::default().title(" Dashboard ").borders(Borders::ALL));
    f.render_widget(para, chunks[1]);
}

fn stats_lines(stats: &DashboardStats, width: usize) -> Vec<Line<'static>> {
    let mut lines = vec![
        Line::from(format!(
            "Users {} · Posts {} · Likes {}",
            stats.total_users, stats.total_posts, stats.total_likes
        )),
        Line::from(""),
        Line::from(Span::styled("Popular authors", Style::default().add_modifier(Modifier::BOLD))),
    ];
    if stats.popular_authors.is_empty() {
        lines.push(Line::from("  No authors yet"));
    }
    for author in &stats.popular_authors {
        lines.push(Line::from(format!(
            "  {} ({} followers · {} updates)",
            author.name, author.followers_count, author.post_count
        )));
    }
    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled("Trending", Style::default().add_modifier(Modifier::BOLD))));
    if stats.trending_posts.is_empty() {
        lines.push(Line::from("  No trending posts"));
    }
    for post in &stats.trending_posts {
        let text = format!("  {}: {} ({} likes)", post.author, post.content, post.like_count);
        lines.push(Line::from(truncate_with_ellipsis(&text, width).into_owned()));
    }
    lines
}

fn draw_notice(f: &mut Frame, notice: Option<&Notice>, area: Rect) {
    let line = match notice {
        Some(notice) => {
            let color = match notice.level {
                NoticeLevel::Info => Color::Gray,
                NoticeLevel::Success => Color::Green,
                NoticeLevel::Error => Color::Red,
            };
            Line::from(vec![
                Span::styled(format!(" {} ", notice.time), Style::default().fg(Color::DarkGray)),
                Span::styled(notice.message.clone(), Style::default().fg(color)),
            ])
        }
        None => Line::from(""),
    };
    f.render_widget(Paragraph::new(line), area);
}

fn draw_footer(f: &mut Frame, view: &ViewState, area: Rect) {
    let help = match view.mode {
        InputMode::Normal => {
            " [j/k] select  [l] like  [d] delete  [c] compose  [n/p] page  [s] sort  [L] per page  [r] refresh  [a] key  [q] quit"
        }
        InputMode::Compose(_) => " [Enter] publish  [Tab] text/attachment  [Esc] cancel",
        InputMode::ConfirmDelete(_) => " [y] delete  [any other key] cancel",
        InputMode::ApiKey(_) => " [Enter] apply  [Esc] cancel  (empty key signs out)",
    };
    let para = Paragraph::new(Span::styled(help, Style::default().fg(Color::DarkGray)));
    f.render_widget(para, area);
}

fn draw_confirm(f: &mut Frame, post_id: u64) {
    let area = centered_rect(40, 5, f.area());
    f.render_widget(Clear, area);
    let para = Paragraph::new(vec![
        Line::from(""),
        Line::from(format!("Delete update #{}? (y/n)", post_id)),
    ])
    .alignment(Alignment::Center)
    .block(Block::default().title(" Confirm ").borders(Borders::ALL));
    f.render_widget(para, area);
}

fn draw_compose(f: &mut Frame, text: &str, attachment: &str, field: ComposeField) {
    let area = centered_rect(70, 9, f.area());
    f.render_widget(Clear, area);
    let active = Style::default().fg(Color::Cyan);
    let idle = Style::default().fg(Color::DarkGray);
    let (text_style, attach_style) = match field {
        ComposeField::Text => (active, idle),
        ComposeField::Attachment => (idle, active),
    };
    let para = Paragraph::new(vec![
        Line::from(Span::styled("Message", text_style)),
        Line::from(format!("{}▏", text)),
        Line::from(""),
        Line::from(Span::styled("Attachment path (optional)", attach_style)),
        Line::from(attachment.to_string()),
        Line::from(Span::styled(format!("{} characters", text.chars().count()), idle)),
    ])
    .wrap(Wrap { trim: false })
    .block(Block::default().title(" New update ").borders(Borders::ALL));
    f.render_widget(para, area);
}

fn draw_api_key(f: &mut Frame, buffer: &str) {
    let area = centered_rect(50, 5, f.area());
    f.render_widget(Clear, area);
    let masked: String = buffer.chars().map(|_| '•').collect();
    let para = Paragraph::new(vec![Line::from("API key:"), Line::from(format!("{}▏", masked))])
        .block(Block::default().title(" Sign in ").borders(Borders::ALL));
    f.render_widget(para, area);
}

fn centered_rect(width: u16, height: u16, outer: Rect) -> Rect {
    let width = width.min(outer.width);
    let height = height.min(outer.height);
    Rect {
        x: outer.x + (outer.width - width) / 2,
        y: outer.y + (outer.height - height) / 2,
        width,
        height,
    }
}

fn truncate_with_ellipsis(s: &str, max_width: usize) -> Cow<'_, str> {
    if s.chars().count() <= max_width {
        return Cow::Borrowed(s);
    }
    if max_width <= 3 {
        return Cow::Owned(s.chars().take(max_width).collect());
    }
    let truncated: String = s.chars().take(max_width - 3).collect();
    Cow::Owned(format!("{}...", truncated))
}
