/// Маркеры секций файла ответа
pub const START_OF_FILE: &str = "START-OF-FILE";
/// Конец файла: дальше строки не читаются
pub const END_OF_FILE: &str = "END-OF-FILE";
/// Начало списка полей
pub const START_OF_FIELDS: &str = "START-OF-FIELDS";
/// Конец списка полей
pub const END_OF_FIELDS: &str = "END-OF-FIELDS";
/// Начало строк с данными
pub const START_OF_DATA: &str = "START-OF-DATA";
/// Конец строк с данными
pub const END_OF_DATA: &str = "END-OF-DATA";

/// Строки, начинающиеся с этого символа, пропускаются
pub const COMMENT_MARKER: char = '#';

/// Разделитель колонок в строке данных
pub const DATA_DELIMITER: char = '|';

/// Заголовки со временем начала/конца выгрузки
pub const HEADER_TIME_STARTED: &str = "TIMESTARTED";
/// Время завершения выгрузки
pub const HEADER_TIME_FINISHED: &str = "TIMEFINISHED";

/// `PROGRAMNAME=gethistory` включает режим исторических (датированных) строк
pub const HEADER_PROGRAM_NAME: &str = "PROGRAMNAME";
/// Значение `PROGRAMNAME` для исторического запроса
pub const PROGRAM_GET_HISTORY: &str = "gethistory";
/// Значение `PROGRAMNAME` для обычного запроса
pub const PROGRAM_GET_DATA: &str = "getdata";

/// Формат дат ответа (в нотации поставщика, например `yyyymmdd`)
pub const HEADER_DATE_FORMAT: &str = "DATEFORMAT";
/// Формат дат по умолчанию, если заголовка нет
pub const DEFAULT_DATE_FORMAT: &str = "yyyymmdd";

/// Коды возврата "ошибка по этому идентификатору": поля не извлекаются
pub const ERROR_RETURN_CODES: [i32; 2] = [9, 10];

/// ID|RC|COUNT|...
pub const PLAIN_PREAMBLE_WIDTH: usize = 3;
/// ID|RC|COUNT|DATE|...
pub const DATED_PREAMBLE_WIDTH: usize = 4;

/// Ключ, дубликаты которого в строковых картах не считаются аномалией
pub const DUPLICATE_KEY_EXEMPT: &str = "#N/A";
