//! Raw platform response shapes and their conversion into [`VideoItem`].

use chrono::{DateTime, Utc};
use serde::Deserialize;
use url::Url;

use crate::error::FetchError;
use crate::model::{Author, VideoAsset, VideoItem};

const UNKNOWN_FORMAT: &str = "unknown";

#[derive(Deserialize, Debug)]
pub(crate) struct ItemListResponse {
    #[serde(rename = "statusCode", alias = "status_code", default)]
    pub status_code: i64,
    #[serde(rename = "statusMsg", alias = "status_msg", default)]
    pub status_msg: Option<String>,
    #[serde(rename = "itemList", alias = "data", default)]
    pub item_list: Option<Vec<RawItem>>,
}

/// The API has served posts in two shapes over time: the app-style shape with
/// `url_list` sub-objects, and the flat web shape with plain URLs.
#[derive(Deserialize, Debug)]
#[serde(untagged)]
pub(crate) enum RawItem {
    Nested(NestedPost),
    Flat(FlatPost),
}

#[derive(Deserialize, Debug)]
pub(crate) struct UrlList {
    #[serde(default)]
    pub url_list: Vec<String>,
}

#[derive(Deserialize, Debug)]
pub(crate) struct NestedPost {
    pub aweme_id: String,
    pub create_time: i64,
    pub video: NestedVideo,
    pub author: NestedAuthor,
    #[serde(default)]
    pub is_ads: bool,
}

#[derive(Deserialize, Debug)]
pub(crate) struct NestedVideo {
    pub play_addr: UrlList,
    pub cover: UrlList,
    pub download_addr: UrlList,
    pub format: Option<String>,
}

#[derive(Deserialize, Debug)]
pub(crate) struct NestedAuthor {
    pub uid: String,
    pub unique_id: String,
    pub nickname: String,
    pub avatar_thumb: UrlList,
    pub avatar_medium: UrlList,
    pub avatar_larger: UrlList,
    #[serde(default)]
    pub signature: String,
    pub sec_uid: String,
    #[serde(default)]
    pub verified: bool,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub(crate) struct FlatPost {
    pub id: String,
    pub create_time: FlexibleInt,
    pub video: FlatVideo,
    pub author: FlatAuthor,
    #[serde(default)]
    pub is_ad: bool,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub(crate) struct FlatVideo {
    pub id: String,
    pub cover: String,
    pub play_addr: String,
    pub download_addr: String,
    pub format: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub(crate) struct FlatAuthor {
    pub id: String,
    pub unique_id: String,
    pub nickname: String,
    pub avatar_thumb: String,
    pub avatar_medium: String,
    pub avatar_larger: String,
    #[serde(default)]
    pub signature: String,
    #[serde(default)]
    pub verified: bool,
    pub sec_uid: String,
}

/// The web API sends `createTime` as a number or a numeric string.
#[derive(Deserialize, Debug)]
#[serde(untagged)]
pub(crate) enum FlexibleInt {
    Number(i64),
    Text(String),
}

impl FlexibleInt {
    fn value(&self) -> Result<i64, FetchError> {
        match self {
            Self::Number(n) => Ok(*n),
            Self::Text(s) => s
                .parse()
                .map_err(|_| FetchError::decode(format!("invalid timestamp '{s}'"))),
        }
    }
}

fn parse_url(field: &str, raw: &str) -> Result<Url, FetchError> {
    Url::parse(raw).map_err(|e| FetchError::decode(format!("{field}: {e}")))
}

fn first_url(field: &str, list: &UrlList) -> Result<Url, FetchError> {
    let raw = list
        .url_list
        .first()
        .ok_or_else(|| FetchError::decode(format!("{field}: empty url_list")))?;
    parse_url(field, raw)
}

fn timestamp(secs: i64) -> Result<DateTime<Utc>, FetchError> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| FetchError::decode(format!("timestamp out of range: {secs}")))
}

impl RawItem {
    pub fn into_video_item(self) -> Result<VideoItem, FetchError> {
        match self {
            Self::Nested(post) => post.into_video_item(),
            Self::Flat(post) => post.into_video_item(),
        }
    }
}

impl NestedPost {
    fn into_video_item(self) -> Result<VideoItem, FetchError> {
        let video = VideoAsset {
            id: self.aweme_id.clone(),
            cover: first_url("video.cover", &self.video.cover)?,
            play_addr: first_url("video.play_addr", &self.video.play_addr)?,
            download_addr: first_url("video.download_addr", &self.video.download_addr)?,
            format: self
                .video
                .format
                .unwrap_or_else(|| UNKNOWN_FORMAT.to_string()),
        };
        let a = self.author;
        let author = Author {
            avatar_thumb: first_url("author.avatar_thumb", &a.avatar_thumb)?,
            avatar_medium: first_url("author.avatar_medium", &a.avatar_medium)?,
            avatar_larger: first_url("author.avatar_larger", &a.avatar_larger)?,
            id: a.uid,
            unique_id: a.unique_id,
            nickname: a.nickname,
            signature: a.signature,
            verified: a.verified,
            sec_uid: a.sec_uid,
        };
        Ok(VideoItem {
            id: self.aweme_id,
            create_time: timestamp(self.create_time)?,
            video,
            author,
            is_ad: self.is_ads,
        })
    }
}

impl FlatPost {
    fn into_video_item(self) -> Result<VideoItem, FetchError> {
        let v = self.video;
        let video = VideoAsset {
            cover: parse_url("video.cover", &v.cover)?,
            play_addr: parse_url("video.playAddr", &v.play_addr)?,
            download_addr: parse_url("video.downloadAddr", &v.download_addr)?,
            id: v.id,
            format: v
                .format
                .filter(|f| !f.is_empty())
                .unwrap_or_else(|| UNKNOWN_FORMAT.to_string()),
        };
        let a = self.author;
        let author = Author {
            avatar_thumb: parse_url("author.avatarThumb", &a.avatar_thumb)?,
            avatar_medium: parse_url("author.avatarMedium", &a.avatar_medium)?,
            avatar_larger: parse_url("author.avatarLarger", &a.avatar_larger)?,
            id: a.id,
            unique_id: a.unique_id,
            nickname: a.nickname,
            signature: a.signature,
            verified: a.verified,
            sec_uid: a.sec_uid,
        };
        Ok(VideoItem {
            id: self.id,
            create_time: timestamp(self.create_time.value()?)?,
            video,
            author,
            is_ad: self.is_ad,
        })
    }
}
